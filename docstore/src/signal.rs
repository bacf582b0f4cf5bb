//! Cooperative cancellation for long-running traversals.
//!
//! An [`InterruptSource`] hands out any number of [`Interruptor`]s. Once the
//! source is pulsed every interruptor observes it; traversals call
//! [`Interruptor::check`] between units of work and stop with [`Interrupted`].

use tokio::sync::watch;

/// The sending half. Pulsing is one-way and permanent.
#[derive(Debug)]
pub struct InterruptSource {
    tx: watch::Sender<bool>,
}

impl InterruptSource {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// An interruptor tied to this source.
    #[must_use]
    pub fn interruptor(&self) -> Interruptor {
        Interruptor {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Signal every interruptor. Later calls are no-ops.
    pub fn pulse(&self) {
        if !self.tx.send_replace(true) {
            tracing::debug!("Interrupt signal pulsed");
        }
    }

    #[must_use]
    pub fn is_pulsed(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for InterruptSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The receiving half, checked by traversals.
#[derive(Debug, Clone)]
pub struct Interruptor {
    rx: Option<watch::Receiver<bool>>,
}

impl Interruptor {
    /// An interruptor that is never pulsed.
    #[must_use]
    pub const fn never() -> Self {
        Self { rx: None }
    }

    #[must_use]
    pub fn is_pulsed(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Fail with [`Interrupted`] once the source has been pulsed.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_pulsed() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}

/// A traversal stopped because its interruptor was pulsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation interrupted")
    }
}

impl std::error::Error for Interrupted {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_is_never_pulsed() {
        assert!(Interruptor::never().check().is_ok());
    }

    #[test]
    fn test_pulse_reaches_every_interruptor() {
        let source = InterruptSource::new();
        let first = source.interruptor();
        let second = first.clone();
        assert!(!first.is_pulsed());

        source.pulse();
        source.pulse();
        assert!(source.is_pulsed());
        assert_eq!(first.check(), Err(Interrupted));
        assert_eq!(second.check(), Err(Interrupted));
    }

    #[test]
    fn test_interruptor_outlives_source() {
        let source = InterruptSource::new();
        let interruptor = source.interruptor();
        source.pulse();
        drop(source);
        assert!(interruptor.is_pulsed());
    }
}
