//! # Daedalus Config
//!
//! Typed configuration for the Daedalus framework.
//!
//! - [`DaedalusConfig`] - [`MvcOptions`](daedalus_core::MvcOptions) plus logging
//! - [`ConfigLoader`] - Layered loading: preset, TOML/JSON files, then
//!   `PREFIX__SECTION__KEY` environment variables
//!
//! Unknown keys in files are rejected. Limits are validated on load.
//!
//! # Example
//!
//! ```no_run
//! use daedalus_config::ConfigLoader;
//!
//! # fn main() -> Result<(), daedalus_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()
//!     .with_optional_file("daedalus.toml")?
//!     .with_env_prefix("DAEDALUS")
//!     .load()?;
//!
//! assert!(config.mvc.max_model_validation_errors > 0);
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/daedalus-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::DaedalusConfig;
pub use error::ConfigError;
pub use loader::{ConfigFormat, ConfigLoader};
