mod cli;
mod conf_file;

use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

pub use cli::CliOverrides;
pub use conf_file::ConfFile;

const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// The environment variable prefix for application configuration.
/// `FLOTILLA_MASTER__PORT` maps to the `master.port` key.
pub const ENV_PREFIX: &str = "FLOTILLA_";

/// The configuration file name looked up inside a `--conf` directory.
pub const CONF_FILE_NAME: &str = "flotilla.conf";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd)]
pub struct ConfigKeyValue {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub master: MasterConfig,
    pub slave: SlaveConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    pub hostname: String,
    pub port: u16,
    /// The interval between periodic allocation rounds.
    pub batch_seconds: f64,
    /// The refusal filter duration applied when a framework declines an
    /// offer without specifying one. Zero disables the filter.
    pub default_refuse_seconds: f64,
    /// Minimum free cpus on a slave before it is considered for offers.
    pub min_cpus: f64,
    /// Minimum free memory (in MB) on a slave before it is considered
    /// for offers.
    pub min_mem: f64,
    /// Outstanding offers are rescinded after this many seconds.
    /// Zero disables offer expiry.
    pub offer_timeout_seconds: f64,
    pub registry_retry_count: usize,
    pub registry_retry_delay_seconds: f64,
    /// Comma-separated hostnames allowed to receive offers; empty allows all.
    pub whitelist: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveConfig {
    pub hostname: String,
    /// The total resources of the slave, e.g. `cpus:4;mem:4096`.
    pub resources: String,
    pub executor_directory: String,
    pub executor_shutdown_timeout_seconds: f64,
    pub status_update_retry_interval_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub quiet: bool,
    pub level: String,
}

/// Inputs for configuration loading beyond the compiled defaults.
#[derive(Debug, Default)]
pub struct ConfigLoadOptions {
    /// A directory containing a `flotilla.conf` file (the `--conf` flag).
    pub conf_dir: Option<PathBuf>,
    /// Key/value overrides from the command line. These take the highest
    /// precedence.
    pub overrides: Vec<ConfigKeyValue>,
}

impl AppConfig {
    pub fn load(options: ConfigLoadOptions) -> CommonResult<Self> {
        let mut figment = Figment::from(Toml::string(DEFAULT_CONFIG));
        if let Some(dir) = &options.conf_dir {
            figment = figment.merge(ConfFile::new(dir.join(CONF_FILE_NAME)));
        }
        figment = figment
            .merge(Env::prefixed(ENV_PREFIX).map(|p| p.as_str().replace("__", ".").into()))
            .merge(CliOverrides::new(options.overrides));
        figment
            .extract()
            .map_err(|e| CommonError::InvalidArgument(e.to_string()))
    }
}
