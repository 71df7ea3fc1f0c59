//! Configuration layer: typed settings with layered precedence (file → env → CLI).
//!
//! ```toml
//! [logging]
//! level = "info"
//! json = false
//!
//! [cache]
//! enable_object_cache = true
//! object_cache_limit = 200
//!
//! [ajax]
//! static_readonly_appearance = false
//! test_mode = false
//! inner_html_updates = false
//!
//! [transform]
//! engine = "identity"
//! location_mode = "smart"
//! ```

mod cli;

use std::str::FromStr;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::transform::{IdentityEngine, LocationMode, engine_by_name};

pub use cli::{
    AjaxOverrides, CliArgs, Command, DiffArgs, LoggingOverrides, TransformArgs, TransformOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "xforms-server";
const DEFAULT_OBJECT_CACHE_LIMIT: usize = 200;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub ajax: AjaxSettings,
    pub transform: TransformSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub enable_object_cache: bool,
    pub object_cache_limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AjaxSettings {
    pub static_readonly_appearance: bool,
    pub test_mode: bool,
    pub inner_html_updates: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSettings {
    pub engine: String,
    pub location_mode: LocationMode,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("XFORMS").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_logging_overrides(&cli.logging);
    match &cli.command {
        Command::Diff(args) => raw.apply_ajax_overrides(&args.overrides),
        Command::Transform(args) => raw.apply_transform_overrides(&args.overrides),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    ajax: RawAjaxSettings,
    transform: RawTransformSettings,
}

impl RawSettings {
    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_ajax_overrides(&mut self, overrides: &AjaxOverrides) {
        if let Some(value) = overrides.test_mode {
            self.ajax.test_mode = Some(value);
        }
        if let Some(value) = overrides.static_readonly_appearance {
            self.ajax.static_readonly_appearance = Some(value);
        }
        if let Some(value) = overrides.inner_html_updates {
            self.ajax.inner_html_updates = Some(value);
        }
    }

    fn apply_transform_overrides(&mut self, overrides: &TransformOverrides) {
        if let Some(engine) = overrides.engine.as_ref() {
            self.transform.engine = Some(engine.clone());
        }
        if let Some(mode) = overrides.location_mode {
            self.transform.location_mode = Some(mode);
        }
        if let Some(enabled) = overrides.enable_object_cache {
            self.cache.enable_object_cache = Some(enabled);
        }
        if let Some(limit) = overrides.object_cache_limit {
            self.cache.object_cache_limit = Some(limit);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        Ok(Self {
            logging: build_logging_settings(raw.logging)?,
            cache: build_cache_settings(raw.cache)?,
            ajax: AjaxSettings {
                static_readonly_appearance: raw.ajax.static_readonly_appearance.unwrap_or(false),
                test_mode: raw.ajax.test_mode.unwrap_or(false),
                inner_html_updates: raw.ajax.inner_html_updates.unwrap_or(false),
            },
            transform: build_transform_settings(raw.transform)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let object_cache_limit = cache.object_cache_limit.unwrap_or(DEFAULT_OBJECT_CACHE_LIMIT);
    if object_cache_limit == 0 {
        return Err(LoadError::invalid(
            "cache.object_cache_limit",
            "must be greater than zero",
        ));
    }
    Ok(CacheSettings {
        enable_object_cache: cache.enable_object_cache.unwrap_or(true),
        object_cache_limit,
    })
}

fn build_transform_settings(
    transform: RawTransformSettings,
) -> Result<TransformSettings, LoadError> {
    let engine = transform
        .engine
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| IdentityEngine::NAME.to_string());
    if engine_by_name(&engine).is_none() {
        return Err(LoadError::invalid(
            "transform.engine",
            format!("unknown engine `{engine}`"),
        ));
    }
    Ok(TransformSettings {
        engine,
        location_mode: transform.location_mode.unwrap_or(LocationMode::Smart),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enable_object_cache: Option<bool>,
    object_cache_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAjaxSettings {
    static_readonly_appearance: Option<bool>,
    test_mode: Option<bool>,
    inner_html_updates: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTransformSettings {
    engine: Option<String>,
    location_mode: Option<LocationMode>,
}

#[cfg(test)]
mod tests;
