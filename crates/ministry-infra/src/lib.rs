//! Ministry Infrastructure Library
//!
//! Shared pieces used by the binaries on top of the storage core:
//! - Telemetry initialization (tracing subscriber)
//! - Error response rendering

pub mod error;
pub mod telemetry;

pub use error::ErrorResponse;
pub use telemetry::{init_telemetry, shutdown_telemetry, DEFAULT_LOG_FILTER};
