//! End-to-end tests at the slice operation level.
//!
//! Each test file covers a specific scenario, driving a whole slice through
//! its public operations with deterministic inputs.

#![cfg(test)]

mod helpers;

mod test_backfill;
mod test_corruption;
mod test_distribution;
mod test_erase;
mod test_modify;
mod test_overflow_values;
mod test_persistence;
mod test_point_writes;
mod test_scan_resume;
mod test_write_failures;
