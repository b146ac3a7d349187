//! Root configuration type.

use crate::error::ConfigError;
use daedalus_core::MvcOptions;
use daedalus_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

/// Complete Daedalus configuration.
///
/// Every section defaults, so a file only names what it changes:
///
/// ```toml
/// [mvc]
/// max_model_validation_errors = 50
/// request_timeout_ms = 2000
///
/// [logging]
/// level = "daedalus_pipeline=debug,info"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaedalusConfig {
    /// Binding, validation and invoker options.
    pub mvc: MvcOptions,

    /// Logging setup.
    pub logging: LogConfig,
}

impl DaedalusConfig {
    /// Pretty logs at debug level with an unlimited request timeout.
    #[must_use]
    pub fn development() -> Self {
        Self {
            mvc: MvcOptions::default(),
            logging: LogConfig::development(),
        }
    }

    /// JSON logs and a 30 second request timeout.
    #[must_use]
    pub fn production() -> Self {
        Self {
            mvc: MvcOptions {
                request_timeout_ms: Some(30_000),
                ..MvcOptions::default()
            },
            logging: LogConfig::production(),
        }
    }

    /// Checks limits and the log filter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mvc = &self.mvc;
        non_zero("mvc.max_model_validation_errors", mvc.max_model_validation_errors)?;
        non_zero(
            "mvc.max_model_binding_recursion_depth",
            mvc.max_model_binding_recursion_depth,
        )?;
        non_zero(
            "mvc.max_model_binding_collection_size",
            mvc.max_model_binding_collection_size,
        )?;
        non_zero("mvc.max_validation_collection_size", mvc.max_validation_collection_size)?;

        if mvc.max_validation_depth == Some(0) {
            return Err(ConfigError::invalid_value(
                "mvc.max_validation_depth",
                "must be greater than 0 or unset",
            ));
        }
        if mvc.request_timeout_ms == Some(0) {
            return Err(ConfigError::invalid_value(
                "mvc.request_timeout_ms",
                "must be greater than 0 or unset",
            ));
        }

        if self.logging.enabled {
            daedalus_telemetry::create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        Ok(())
    }
}

fn non_zero(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid_value(field, "must be greater than 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DaedalusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mvc.max_model_validation_errors, 200);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_presets() {
        let dev = DaedalusConfig::development();
        assert_eq!(dev.logging.level, "debug");
        assert!(dev.mvc.request_timeout_ms.is_none());

        let prod = DaedalusConfig::production();
        assert!(prod.logging.json_format);
        assert_eq!(prod.mvc.request_timeout_ms, Some(30_000));
        assert!(prod.validate().is_ok());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config = DaedalusConfig::default();
        config.mvc.max_model_binding_collection_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mvc.max_model_binding_collection_size"));
    }

    #[test]
    fn test_zero_depth_rejected_but_unset_allowed() {
        let mut config = DaedalusConfig::default();
        config.mvc.max_validation_depth = Some(0);
        assert!(config.validate().is_err());

        config.mvc.max_validation_depth = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_filter_rejected() {
        let mut config = DaedalusConfig::default();
        config.logging.level = "daedalus=verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "logging.level"
        ));

        config.logging.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<DaedalusConfig, _> =
            serde_json::from_str(r#"{ "mvc": { "max_errors": 5 } }"#);
        assert!(result.is_err());
    }
}
