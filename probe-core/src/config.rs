//! Prober Configuration
//!
//! All settings come from the environment (a `.env` file is loaded by the
//! binary before this runs). Credentials and the bucket are required;
//! everything else has a default.
//! A value that is present but does not parse is an error, never a
//! silent fallback to the default.

use probe_storage::{PutOptions, S3Config};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::cycle::ProbeSettings;
use crate::dispatcher::{DispatcherConfig, RunMode};
use crate::identity::{IdentityError, IdentityGenerator};
use crate::telemetry::{LogConfig, LogFormat, LogLevel, MetricsExporterConfig};

pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_BUCKET: &str = "BUCKET_NAME";
pub const ENV_ENDPOINT_URL: &str = "S3_ENDPOINT_URL";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_FORCE_PATH_STYLE: &str = "S3_FORCE_PATH_STYLE";
pub const ENV_REFERENCE_FILE: &str = "PROBE_REFERENCE_FILE";
pub const ENV_STAGING_DIR: &str = "PROBE_STAGING_DIR";
pub const ENV_OBJECT_PREFIX: &str = "PROBE_OBJECT_PREFIX";
pub const ENV_OBJECT_EXTENSION: &str = "PROBE_OBJECT_EXTENSION";
pub const ENV_OBJECT_ACL: &str = "PROBE_OBJECT_ACL";
pub const ENV_CONTENT_TYPE: &str = "PROBE_CONTENT_TYPE";
pub const ENV_INTERVAL_SECS: &str = "PROBE_INTERVAL_SECS";
pub const ENV_SETTLE_SECS: &str = "PROBE_SETTLE_SECS";
pub const ENV_MAX_IN_FLIGHT: &str = "PROBE_MAX_IN_FLIGHT";
pub const ENV_RUN_MODE: &str = "PROBE_RUN_MODE";
pub const ENV_CLEANUP_ON_MISMATCH: &str = "PROBE_CLEANUP_ON_MISMATCH";
pub const ENV_METRICS_MODE: &str = "PROBE_METRICS_MODE";
pub const ENV_METRICS_BIND: &str = "PROBE_METRICS_BIND";
pub const ENV_METRICS_PORT: &str = "PROBE_METRICS_PORT";
pub const ENV_PUSH_GATEWAY_URL: &str = "PROBE_PUSH_GATEWAY_URL";
pub const ENV_PUSH_INTERVAL_SECS: &str = "PROBE_PUSH_INTERVAL_SECS";
pub const ENV_LOG_LEVEL: &str = "PROBE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "PROBE_LOG_FORMAT";

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Reference file {path}: {reason}")]
    ReferenceFile { path: String, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, value: impl ToString, reason: impl ToString) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Exposition mode selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetricsMode {
    #[default]
    Pull,
    Push,
    Disabled,
}

impl MetricsMode {
    /// Parse from string (for environment variables)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pull" => Some(Self::Pull),
            "push" => Some(Self::Push),
            "disabled" | "off" | "none" => Some(Self::Disabled),
            _ => None,
        }
    }
}

/// Complete prober configuration
#[derive(Clone)]
pub struct ProbeConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub endpoint_url: Option<String>,
    pub region: String,
    pub force_path_style: bool,

    pub reference_file: PathBuf,
    pub staging_dir: PathBuf,
    pub object_prefix: String,
    pub object_extension: String,
    pub object_acl: String,
    pub content_type: String,

    pub interval: Duration,
    pub settle_delay: Duration,
    pub max_in_flight: usize,
    pub run_mode: RunMode,
    pub cleanup_on_mismatch: bool,

    pub metrics_mode: MetricsMode,
    pub metrics_bind: IpAddr,
    pub metrics_port: u16,
    pub push_gateway_url: Option<String>,
    pub push_interval: Duration,

    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for ProbeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .field("reference_file", &self.reference_file)
            .field("staging_dir", &self.staging_dir)
            .field("object_prefix", &self.object_prefix)
            .field("object_extension", &self.object_extension)
            .field("object_acl", &self.object_acl)
            .field("content_type", &self.content_type)
            .field("interval", &self.interval)
            .field("settle_delay", &self.settle_delay)
            .field("max_in_flight", &self.max_in_flight)
            .field("run_mode", &self.run_mode)
            .field("cleanup_on_mismatch", &self.cleanup_on_mismatch)
            .field("metrics_mode", &self.metrics_mode)
            .field("metrics_bind", &self.metrics_bind)
            .field("metrics_port", &self.metrics_port)
            .field("push_gateway_url", &self.push_gateway_url)
            .field("push_interval", &self.push_interval)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ProbeConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            access_key_id: required(ENV_ACCESS_KEY_ID)?,
            secret_access_key: required(ENV_SECRET_ACCESS_KEY)?,
            bucket: required(ENV_BUCKET)?,
            endpoint_url: get(ENV_ENDPOINT_URL),
            region: or_default(ENV_REGION, "us-east-1"),
            force_path_style: parse_bool(ENV_FORCE_PATH_STYLE, get(ENV_FORCE_PATH_STYLE), false)?,

            reference_file: PathBuf::from(or_default(ENV_REFERENCE_FILE, "original.jpg")),
            staging_dir: PathBuf::from(or_default(ENV_STAGING_DIR, ".")),
            object_prefix: or_default(ENV_OBJECT_PREFIX, "test"),
            object_extension: or_default(ENV_OBJECT_EXTENSION, "jpg"),
            object_acl: or_default(ENV_OBJECT_ACL, "public-read"),
            content_type: or_default(ENV_CONTENT_TYPE, "image/jpeg"),

            interval: Duration::from_secs(parse_value(ENV_INTERVAL_SECS, get(ENV_INTERVAL_SECS), 10)?),
            settle_delay: Duration::from_secs(parse_value(ENV_SETTLE_SECS, get(ENV_SETTLE_SECS), 1)?),
            max_in_flight: parse_value(ENV_MAX_IN_FLIGHT, get(ENV_MAX_IN_FLIGHT), 4)?,
            run_mode: parse_with(ENV_RUN_MODE, get(ENV_RUN_MODE), RunMode::parse, "expected continuous or once")?,
            cleanup_on_mismatch: parse_bool(
                ENV_CLEANUP_ON_MISMATCH,
                get(ENV_CLEANUP_ON_MISMATCH),
                true,
            )?,

            metrics_mode: parse_with(
                ENV_METRICS_MODE,
                get(ENV_METRICS_MODE),
                MetricsMode::parse,
                "expected pull, push or disabled",
            )?,
            metrics_bind: parse_value(
                ENV_METRICS_BIND,
                get(ENV_METRICS_BIND),
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            )?,
            metrics_port: parse_value(ENV_METRICS_PORT, get(ENV_METRICS_PORT), 8000)?,
            push_gateway_url: get(ENV_PUSH_GATEWAY_URL),
            push_interval: Duration::from_secs(parse_value(
                ENV_PUSH_INTERVAL_SECS,
                get(ENV_PUSH_INTERVAL_SECS),
                15,
            )?),

            log_level: parse_with(ENV_LOG_LEVEL, get(ENV_LOG_LEVEL), LogLevel::parse, "expected trace, debug, info, warn or error")?,
            log_format: parse_with(ENV_LOG_FORMAT, get(ENV_LOG_FORMAT), LogFormat::parse, "expected compact, pretty or json")?,
        })
    }

    /// Check the configuration before anything is dispatched
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_key_id.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_ACCESS_KEY_ID));
        }
        if self.secret_access_key.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_SECRET_ACCESS_KEY));
        }
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_BUCKET));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::invalid(ENV_INTERVAL_SECS, 0, "must be greater than zero"));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::invalid(ENV_MAX_IN_FLIGHT, 0, "must be at least 1"));
        }
        if self.metrics_mode == MetricsMode::Push {
            if self.push_gateway_url.is_none() {
                return Err(ConfigError::Missing(ENV_PUSH_GATEWAY_URL));
            }
            if self.push_interval.is_zero() {
                return Err(ConfigError::invalid(ENV_PUSH_INTERVAL_SECS, 0, "must be greater than zero"));
            }
        }

        self.identity_generator().map_err(|e| match e {
            IdentityError::InvalidExtension(value) => {
                ConfigError::invalid(ENV_OBJECT_EXTENSION, value, "must not contain '-', '.' or '/'")
            }
            other => ConfigError::invalid(ENV_OBJECT_PREFIX, &self.object_prefix, other),
        })?;

        let reference_error = |reason: &str| ConfigError::ReferenceFile {
            path: self.reference_file.display().to_string(),
            reason: reason.to_string(),
        };
        let metadata = std::fs::metadata(&self.reference_file)
            .map_err(|e| reference_error(&e.to_string()))?;
        if !metadata.is_file() {
            return Err(reference_error("not a regular file"));
        }

        Ok(())
    }

    /// S3 client settings
    pub fn s3_config(&self) -> S3Config {
        let mut config = S3Config::aws(&self.region, &self.access_key_id, &self.secret_access_key)
            .with_path_style(self.force_path_style);
        if let Some(endpoint) = &self.endpoint_url {
            config = config.with_endpoint(endpoint);
        }
        config
    }

    /// Per-cycle settings
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings::new(&self.bucket, self.reference_file.clone())
            .with_staging_dir(self.staging_dir.clone())
            .with_settle_delay(self.settle_delay)
            .with_cleanup_on_mismatch(self.cleanup_on_mismatch)
            .with_put_options(PutOptions::new(&self.object_acl, &self.content_type))
    }

    /// Dispatcher settings
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            interval: self.interval,
            run_mode: self.run_mode,
            max_in_flight: self.max_in_flight,
            ..Default::default()
        }
    }

    /// Identity generator for the configured prefix and extension
    pub fn identity_generator(&self) -> Result<IdentityGenerator, IdentityError> {
        IdentityGenerator::new(&self.object_prefix, &self.object_extension)
    }

    /// Logging settings
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            format: self.log_format,
            ..Default::default()
        }
    }

    /// Exposition settings
    ///
    /// Single-shot runs never open a listener, so pull mode becomes disabled.
    pub fn exporter_config(&self) -> MetricsExporterConfig {
        match (self.metrics_mode, self.run_mode) {
            (MetricsMode::Disabled, _) | (MetricsMode::Pull, RunMode::Once) => {
                MetricsExporterConfig::Disabled
            }
            (MetricsMode::Pull, RunMode::Continuous) => MetricsExporterConfig::Pull {
                bind: self.metrics_bind,
                port: self.metrics_port,
            },
            (MetricsMode::Push, _) => match &self.push_gateway_url {
                Some(url) => MetricsExporterConfig::Push {
                    gateway_url: url.clone(),
                    interval: self.push_interval,
                },
                None => MetricsExporterConfig::Disabled,
            },
        }
    }
}

fn parse_value<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(var, &raw, e)),
        None => Ok(default),
    }
}

fn parse_bool(var: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::invalid(var, raw, "expected true or false")),
        },
        None => Ok(default),
    }
}

fn parse_with<T: Default>(
    var: &'static str,
    value: Option<String>,
    parse: fn(&str) -> Option<T>,
    expected: &str,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => parse(raw.trim()).ok_or_else(|| ConfigError::invalid(var, raw, expected)),
        None => Ok(T::default()),
    }
}
