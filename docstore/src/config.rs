//! Store configuration.
//!
//! Configuration is read from environment variables.
//!
//! # Environment Variables
//!
//! - `DOCSTORE_DATABASE_PATH`: Path of the database file (default: `./data/docstore.db`)
//! - `DOCSTORE_SCAN_CHUNK_SIZE`: Size cap of one scan response chunk in bytes (default: `1048576`)
//! - `DOCSTORE_FILE_GROWTH_PAGES`: Pages added each time the file grows (default: `64`)
//!
//! # Invariants
//!
//! - `scan_chunk_size` is never zero
//! - `file_growth_pages` is never zero

use std::path::PathBuf;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Path of the database file.
    pub database_path: PathBuf,
    /// A stream-mode scan stops once its estimated response size reaches this.
    pub scan_chunk_size: u64,
    /// Pages allocated at once when the database file needs to grow.
    pub file_growth_pages: u32,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(Self::DEFAULT_DATABASE_PATH),
            scan_chunk_size: Self::DEFAULT_SCAN_CHUNK_SIZE,
            file_growth_pages: Self::DEFAULT_FILE_GROWTH_PAGES,
        }
    }
}

impl StoreConfig {
    pub const DEFAULT_DATABASE_PATH: &'static str = "./data/docstore.db";
    pub const DEFAULT_SCAN_CHUNK_SIZE: u64 = 1024 * 1024;
    pub const DEFAULT_FILE_GROWTH_PAGES: u32 = 64;

    /// Load configuration from environment variables, falling back to the
    /// defaults for unset ones.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is set but is not a positive
    /// integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_path = lookup("DOCSTORE_DATABASE_PATH")
            .map_or_else(|| PathBuf::from(Self::DEFAULT_DATABASE_PATH), PathBuf::from);
        let scan_chunk_size = load_positive(
            &lookup,
            "DOCSTORE_SCAN_CHUNK_SIZE",
            Self::DEFAULT_SCAN_CHUNK_SIZE,
        )?;
        let file_growth_pages = load_positive(
            &lookup,
            "DOCSTORE_FILE_GROWTH_PAGES",
            Self::DEFAULT_FILE_GROWTH_PAGES,
        )?;

        Ok(Self {
            database_path,
            scan_chunk_size,
            file_growth_pages,
        })
    }
}

fn load_positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + From<u8>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.parse::<T>() {
        Ok(parsed) if parsed != T::from(0) => Ok(parsed),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a positive integer"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = StoreConfig::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.scan_chunk_size, 1_048_576);
        assert_eq!(config.file_growth_pages, 64);
        assert_eq!(config.database_path, PathBuf::from("./data/docstore.db"));
    }

    #[test]
    fn test_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("DOCSTORE_DATABASE_PATH", "/tmp/x.db"),
            ("DOCSTORE_SCAN_CHUNK_SIZE", "4096"),
            ("DOCSTORE_FILE_GROWTH_PAGES", "8"),
        ]))
        .expect("config");
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.scan_chunk_size, 4096);
        assert_eq!(config.file_growth_pages, 8);
    }

    #[test]
    fn test_rejects_zero_and_garbage() {
        let err = StoreConfig::from_lookup(lookup(&[("DOCSTORE_SCAN_CHUNK_SIZE", "0")]))
            .expect_err("zero");
        assert_eq!(
            err.to_string(),
            "invalid value for DOCSTORE_SCAN_CHUNK_SIZE: '0' is not a positive integer"
        );

        let err = StoreConfig::from_lookup(lookup(&[("DOCSTORE_FILE_GROWTH_PAGES", "lots")]))
            .expect_err("garbage");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
