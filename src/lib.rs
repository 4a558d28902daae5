//! Main library crate for the BearCart reconciliation pipeline

// Re-export the main modules needed for integration tests
pub mod common;
pub mod domain;
pub mod observability;
pub mod pipeline;

// Re-export commonly used types
pub use common::error::{EtlError, Result};
pub use domain::ReconciledRecord;
