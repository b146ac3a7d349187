//! # Daedalus Telemetry
//!
//! Logging and metrics for the Daedalus request pipeline.
//!
//! - [`logging`] - `tracing-subscriber` setup with JSON or pretty output
//! - [`metrics`] - Counters and histograms emitted by the action invoker
//!
//! # Example
//!
//! ```rust,ignore
//! use daedalus_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production())?;
//! daedalus_telemetry::metrics::describe_metrics();
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};
pub use metrics::InFlightGuard;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
