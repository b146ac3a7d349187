//! Layered configuration loading.
//!
//! Layers apply in call order: a preset, then files and strings, then
//! environment variables. Each layer only overrides the keys it names.

use crate::config::DaedalusConfig;
use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Source format for [`ConfigLoader::with_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML.
    Toml,
    /// JSON.
    Json,
}

impl ConfigFormat {
    /// Picks the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Builds a [`DaedalusConfig`] from layered sources.
///
/// # Example
///
/// ```no_run
/// use daedalus_config::ConfigLoader;
///
/// # fn main() -> Result<(), daedalus_config::ConfigError> {
/// let config = ConfigLoader::with_production()
///     .with_file("config/daedalus.toml")?
///     .with_optional_file("config/local.toml")?
///     .with_env_prefix("DAEDALUS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    base: DaedalusConfig,
    layers: Vec<Value>,
    env_prefix: Option<String>,
    files_loaded: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Starts from [`DaedalusConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_base(DaedalusConfig::default())
    }

    /// Starts from [`DaedalusConfig::development`].
    #[must_use]
    pub fn with_development() -> Self {
        Self::with_base(DaedalusConfig::development())
    }

    /// Starts from [`DaedalusConfig::production`].
    #[must_use]
    pub fn with_production() -> Self {
        Self::with_base(DaedalusConfig::production())
    }

    /// Starts from an explicit configuration.
    #[must_use]
    pub fn with_base(base: DaedalusConfig) -> Self {
        Self {
            base,
            layers: Vec::new(),
            env_prefix: None,
            files_loaded: Vec::new(),
        }
    }

    /// Merges a TOML or JSON file, chosen by extension.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.layers.push(parse_layer(&content, format)?);
        self.files_loaded.push(path.to_path_buf());
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Merges configuration text.
    pub fn with_string(mut self, content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        self.layers.push(parse_layer(content, format)?);
        Ok(self)
    }

    /// Enables `PREFIX__SECTION__KEY` environment overrides.
    ///
    /// `DAEDALUS__MVC__REQUEST_TIMEOUT_MS=1500` sets `mvc.request_timeout_ms`.
    /// Variables that name no existing key are ignored.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Loads a `.env` file into the process environment if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Files merged so far.
    #[must_use]
    pub fn files_loaded(&self) -> &[PathBuf] {
        &self.files_loaded
    }

    /// Merges all layers, applies environment overrides and validates.
    pub fn load(self) -> Result<DaedalusConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Merges all layers and applies environment overrides.
    pub fn load_unvalidated(self) -> Result<DaedalusConfig, ConfigError> {
        let vars: Vec<(String, String)> = match &self.env_prefix {
            Some(_) => std::env::vars().collect(),
            None => Vec::new(),
        };
        self.resolve(vars)
    }

    fn resolve(self, vars: impl IntoIterator<Item = (String, String)>) -> Result<DaedalusConfig, ConfigError> {
        let mut value = serde_json::to_value(&self.base)?;
        for layer in self.layers {
            merge(&mut value, layer);
        }

        if let Some(prefix) = &self.env_prefix {
            let marker = format!("{prefix}__");
            for (name, raw) in vars {
                if let Some(path) = name.strip_prefix(&marker) {
                    apply_env_var(&mut value, &name, path, &raw)?;
                }
            }
        }

        Ok(serde_json::from_value(value)?)
    }
}

fn parse_layer(content: &str, format: ConfigFormat) -> Result<Value, ConfigError> {
    let value: Value = match format {
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };
    // Unknown keys are reported when the merged tree is deserialized.
    Ok(value)
}

/// Deep merge; scalars and arrays in `layer` replace those in `target`.
fn merge(target: &mut Value, layer: Value) {
    match (target, layer) {
        (Value::Object(target), Value::Object(layer)) => {
            for (key, value) in layer {
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, layer) => *target = layer,
    }
}

fn apply_env_var(root: &mut Value, var: &str, path: &str, raw: &str) -> Result<(), ConfigError> {
    let keys: Vec<String> = path.split("__").map(str::to_lowercase).collect();
    let Some((last, parents)) = keys.split_last() else {
        return Ok(());
    };

    let mut node: &mut Map<String, Value> = match root {
        Value::Object(map) => map,
        _ => return Ok(()),
    };
    for key in parents {
        match node.get_mut(key) {
            Some(Value::Object(child)) => node = child,
            _ => return Ok(()),
        }
    }

    if let Some(slot) = node.get_mut(last) {
        *slot = parse_env_value(var, slot, raw)?;
    }
    Ok(())
}

/// Parses `raw` according to the type currently held at the key.
fn parse_env_value(var: &str, current: &Value, raw: &str) -> Result<Value, ConfigError> {
    let raw = raw.trim();
    match current {
        Value::String(_) => Ok(Value::String(raw.to_string())),
        Value::Bool(_) => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| ConfigError::env_parse_error(var, format!("expected boolean, got '{raw}'"))),
        Value::Number(_) => {
            if is_unset(raw) {
                return Ok(Value::Null);
            }
            parse_number(raw)
                .ok_or_else(|| ConfigError::env_parse_error(var, format!("expected integer, got '{raw}'")))
        }
        Value::Null => {
            if is_unset(raw) {
                Ok(Value::Null)
            } else if let Some(number) = parse_number(raw) {
                Ok(number)
            } else if let Some(flag) = parse_bool(raw) {
                Ok(Value::Bool(flag))
            } else {
                Ok(Value::String(raw.to_string()))
            }
        }
        Value::Array(_) | Value::Object(_) => {
            serde_json::from_str(raw).map_err(|e| ConfigError::env_parse_error(var, e.to_string()))
        }
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    raw.parse::<u64>()
        .map(Value::from)
        .or_else(|_| raw.parse::<i64>().map(Value::from))
        .ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn is_unset(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("none") || raw.eq_ignore_ascii_case("null")
}
