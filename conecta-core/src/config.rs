use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConectaError, Result};
use crate::logging::{LogConfig, LogFormat};

/// Process-level settings for the `conecta` binary.
///
/// Defaults are layered under `CONECTA_*` environment variables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoaderSettings {
    /// Connection cap used when a command does not pass one.
    pub max_pool_size: Option<u32>,
    /// Pre-size partition buffers from probed row counts.
    pub preallocation: bool,
    /// How long a worker waits for a pooled connection before giving up.
    pub acquire_timeout_seconds: u64,
    /// Log filter directive, e.g. "info" or "conecta_core=debug".
    pub log_level: String,
    /// Log format: "compact" or "json".
    pub log_format: String,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            max_pool_size: None,
            preallocation: true,
            acquire_timeout_seconds: 30,
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

impl LoaderSettings {
    pub fn load() -> Result<Self> {
        let defaults_json = serde_json::to_string(&Self::default())
            .map_err(|err| ConectaError::Internal(format!("failed to serialize defaults: {err}")))?;
        let settings = config::Config::builder()
            .add_source(
                config::File::from_str(&defaults_json, config::FileFormat::Json).required(false),
            )
            .add_source(config::Environment::with_prefix("CONECTA").try_parsing(true))
            .build()
            .map_err(|err| ConectaError::config(format!("failed to load configuration: {err}")))?;
        let cfg: LoaderSettings = settings.try_deserialize().map_err(|err| {
            ConectaError::config(format!("failed to deserialize configuration: {err}"))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.max_pool_size == Some(0) {
            return Err(ConectaError::config("CONECTA_MAX_POOL_SIZE must be greater than 0"));
        }
        self.log_format.parse::<LogFormat>()?;
        Ok(())
    }

    pub fn log_config(&self) -> Result<LogConfig> {
        Ok(LogConfig {
            level: self.log_level.clone(),
            format: self.log_format.parse()?,
        })
    }

    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            max_pool_size: self.max_pool_size,
            preallocation: self.preallocation,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_seconds),
        }
    }
}

/// Execution options recognised in a read call's extra options.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    pub max_pool_size: Option<u32>,
    pub preallocation: bool,
    pub acquire_timeout: Duration,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            max_pool_size: None,
            preallocation: true,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl ReadOptions {
    /// Parse the recognised keys out of a loose option map.
    ///
    /// Unknown keys are ignored. A recognised key with a value that does not
    /// parse is a configuration error.
    pub fn from_extra_options(options: &HashMap<String, String>) -> Result<Self> {
        let mut read = Self::default();
        for (key, value) in options {
            match key.as_str() {
                "max_pool_size" | "maxPoolSize" => {
                    let size = value.trim().parse::<u32>().map_err(|_| {
                        ConectaError::config(format!("invalid {key}: {value}"))
                    })?;
                    read.max_pool_size = Some(size);
                }
                "preallocation" => {
                    read.preallocation = parse_bool(value).ok_or_else(|| {
                        ConectaError::config(format!("invalid preallocation: {value}"))
                    })?;
                }
                other => debug!(option = other, "ignoring unrecognised read option"),
            }
        }
        Ok(read)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn extra_options_recognise_both_spellings() {
        let read = ReadOptions::from_extra_options(&options(&[("maxPoolSize", "8")])).unwrap();
        assert_eq!(read.max_pool_size, Some(8));

        let read = ReadOptions::from_extra_options(&options(&[
            ("max_pool_size", "2"),
            ("preallocation", "false"),
        ]))
        .unwrap();
        assert_eq!(read.max_pool_size, Some(2));
        assert!(!read.preallocation);
    }

    #[test]
    fn extra_options_ignore_unknown_keys() {
        let read =
            ReadOptions::from_extra_options(&options(&[("protocol", "binary")])).unwrap();
        assert_eq!(read, ReadOptions::default());
    }

    #[test]
    fn extra_options_reject_bad_values() {
        let err = ReadOptions::from_extra_options(&options(&[("maxPoolSize", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConectaError::Config(_)));

        let err = ReadOptions::from_extra_options(&options(&[("preallocation", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConectaError::Config(_)));
    }

    #[test]
    fn default_settings_validate() {
        let settings = LoaderSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.read_options(), ReadOptions::default());
    }
}
