use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod flink_settings;

pub use flink_settings::FlinkSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Settings {
    #[serde(default)]
    pub flink: FlinkSettings,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("configuration file not found: {0:?}")]
    ConfigNotFound(PathBuf),
}

impl Settings {
    pub const APP_ENV_PREFIX: &'static str = "APP";
    pub const ENV_SEPARATOR: &'static str = "__";
    const DEFAULT_RESOURCES_DIR: &'static str = "./resources";
    const APPLICATION_BASENAME: &'static str = "application";

    /// Layer configuration sources, lowest precedence first: `{resources}/application.*`, the
    /// `--config` file, `APP__`-prefixed environment variables, then command line overrides.
    #[tracing::instrument(level = "info")]
    pub fn load(options: &CliOptions) -> Result<Self, SettingsError> {
        let config = Self::config_builder(options)?.build()?;
        let settings: Self = config.try_deserialize()?;
        tracing::info!(?settings, "settings loaded");
        Ok(settings)
    }

    fn config_builder(options: &CliOptions) -> Result<ConfigBuilder<DefaultState>, SettingsError> {
        let resources = options
            .resources
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_RESOURCES_DIR));
        let application = resources.join(Self::APPLICATION_BASENAME);

        let mut builder =
            Config::builder().add_source(File::with_name(application.to_string_lossy().as_ref()).required(false));

        if let Some(ref path) = options.config {
            if !path.exists() {
                return Err(SettingsError::ConfigNotFound(path.clone()));
            }
            builder = builder.add_source(File::from(path.clone()));
        }

        builder = builder.add_source(
            Environment::with_prefix(Self::APP_ENV_PREFIX)
                .prefix_separator(Self::ENV_SEPARATOR)
                .separator(Self::ENV_SEPARATOR),
        );

        if let Some(ref endpoint) = options.endpoint {
            builder = builder.set_override("flink.endpoint", endpoint.as_str())?;
        }

        Ok(builder)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Clone, Debug, PartialEq, Eq)]
#[clap(author, version, about)]
pub struct CliOptions {
    /// override configuration file to load, layered over `{resources}/application.*`.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Override default location from which to load configuration files. Default directory is
    /// ./resources.
    #[clap(short, long)]
    pub resources: Option<PathBuf>,

    /// JobManager REST endpoint to initialize against, e.g. http://localhost:8081
    #[clap(short, long)]
    pub endpoint: Option<String>,

    #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write the prometheus registry to stderr once the command completes.
    #[clap(long)]
    pub emit_metrics: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Connection status and cluster overview.
    Status,
    /// Cluster slot and job totals.
    Cluster,
    /// List jobs with their states.
    Jobs,
    /// Job details, vertices and execution configuration.
    Job { job_id: String },
    /// Root cause and exception history of a job.
    Exceptions { job_id: String },
    /// Fetch a job's health metrics and evaluate diagnostic rules.
    DiagnoseJob { job_id: String },
    /// List taskmanagers with capacity assessments.
    Taskmanagers,
    /// Taskmanager hardware, memory and resource assessment.
    Taskmanager { taskmanager_id: String },
    /// List available taskmanager metrics, or fetch the named ones.
    TmMetrics {
        taskmanager_id: String,
        #[clap(short, long, value_delimiter = ',')]
        metrics: Vec<String>,
    },
    /// Backpressure and skew assessment of one job vertex.
    Backpressure { job_id: String, vertex_id: String },
    /// List uploaded jar files.
    Jars,
}
