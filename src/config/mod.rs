//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use cron::Schedule;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::tx::DEFAULT_MAX_RETRIES;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "renditiond";
const DEFAULT_DEFINITIONS_DIR: &str = "config/renditions";
const DEFAULT_RELOAD_CRON: &str = "0 */10 * * * *";
const DEFAULT_INITIAL_AND_ON_ERROR_CRON: &str = "0 * * * * *";
const DEFAULT_MAX_CONCURRENT_TRANSFORMS: u32 = 4;

/// Command-line arguments for the `renditiond` binary.
#[derive(Debug, Parser)]
#[command(
    name = "renditiond",
    version,
    about = "Asynchronous rendition orchestration engine"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "RENDITIOND_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone, PartialEq, Eq)]
pub enum Command {
    /// Parse the rendition definition directory and report every entry.
    Check,
    /// Print the registered rendition definitions.
    List,
    /// Reload definitions on schedule until interrupted.
    Watch,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the directory holding rendition definition documents.
    #[arg(long = "definitions-dir", value_name = "PATH", global = true)]
    pub definitions_dir: Option<PathBuf>,

    /// Override the steady-state reload schedule.
    #[arg(long = "reload-cron", value_name = "CRON", global = true)]
    pub reload_cron: Option<String>,

    /// Override the bound on concurrently running transforms.
    #[arg(long = "max-concurrent-transforms", value_name = "COUNT", global = true)]
    pub max_concurrent_transforms: Option<u32>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub renditions: RenditionsSettings,
    pub dispatch: DispatchSettings,
    pub transactions: TransactionSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenditionsSettings {
    pub enabled: bool,
    pub thumbnails_enabled: bool,
    pub definitions_dir: PathBuf,
    pub reload_cron: Schedule,
    pub initial_and_on_error_cron: Schedule,
}

impl RenditionsSettings {
    /// Requests are accepted only when both switches are on.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.thumbnails_enabled
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_concurrent_transforms: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct TransactionSettings {
    pub max_retries: u32,
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

    builder = builder.add_source(Environment::with_prefix("RENDITIOND").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

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
    renditions: RawRenditionsSettings,
    dispatch: RawDispatchSettings,
    transactions: RawTransactionSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(dir) = overrides.definitions_dir.as_ref() {
            self.renditions.config_dir = Some(dir.clone());
        }
        if let Some(cron) = overrides.reload_cron.as_ref() {
            self.renditions.cron = Some(cron.clone());
        }
        if let Some(max) = overrides.max_concurrent_transforms {
            self.dispatch.max_concurrent_transforms = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            renditions,
            dispatch,
            transactions,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            renditions: build_renditions_settings(renditions)?,
            dispatch: build_dispatch_settings(dispatch)?,
            transactions: TransactionSettings {
                max_retries: transactions.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            },
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

fn build_renditions_settings(
    renditions: RawRenditionsSettings,
) -> Result<RenditionsSettings, LoadError> {
    let definitions_dir = renditions
        .config_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DEFINITIONS_DIR));
    if definitions_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "renditions.config_dir",
            "path must not be empty",
        ));
    }

    let reload_cron = parse_schedule(
        renditions.cron.as_deref().unwrap_or(DEFAULT_RELOAD_CRON),
        "renditions.cron",
    )?;
    let initial_and_on_error_cron = parse_schedule(
        renditions
            .initial_and_on_error_cron
            .as_deref()
            .unwrap_or(DEFAULT_INITIAL_AND_ON_ERROR_CRON),
        "renditions.initial_and_on_error_cron",
    )?;

    Ok(RenditionsSettings {
        enabled: renditions.enabled.unwrap_or(true),
        thumbnails_enabled: renditions.thumbnails_enabled.unwrap_or(true),
        definitions_dir,
        reload_cron,
        initial_and_on_error_cron,
    })
}

fn build_dispatch_settings(dispatch: RawDispatchSettings) -> Result<DispatchSettings, LoadError> {
    let value = dispatch
        .max_concurrent_transforms
        .unwrap_or(DEFAULT_MAX_CONCURRENT_TRANSFORMS);
    let max_concurrent_transforms = NonZeroU32::new(value).ok_or_else(|| {
        LoadError::invalid(
            "dispatch.max_concurrent_transforms",
            "must be greater than zero",
        )
    })?;
    Ok(DispatchSettings {
        max_concurrent_transforms,
    })
}

fn parse_schedule(expression: &str, key: &'static str) -> Result<Schedule, LoadError> {
    Schedule::from_str(expression.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid cron expression: {err}")))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenditionsSettings {
    enabled: Option<bool>,
    thumbnails_enabled: Option<bool>,
    config_dir: Option<PathBuf>,
    cron: Option<String>,
    initial_and_on_error_cron: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDispatchSettings {
    max_concurrent_transforms: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTransactionSettings {
    max_retries: Option<u32>,
}
