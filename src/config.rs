use crate::error::Error;
use clap::Args as ClapArgs;
use config::{Config as Loader, Environment, File};
use serde::Deserialize;

const DEFAULT_API_ENDPOINT: &str = "https://googleads.googleapis.com/v19";
const DEFAULT_WORKERS: &str = "10";

#[derive(ClapArgs, Debug)]
pub struct Config {
    /// Manager (MCC) account id granting query access to the child accounts.
    #[arg(long, env = "MCC_ID")]
    pub(crate) mcc_id: String,

    /// Cloud project owning the warehouse dataset.
    #[arg(long, env = "PROJECT_ID")]
    pub(crate) project_id: String,

    /// Warehouse dataset receiving the three daily tables.
    #[arg(long, env = "DATASET_ID")]
    pub(crate) dataset_id: String,

    /// Path to the ads API YAML config file.
    #[arg(long, env = "ADS_CONFIG_FILE")]
    pub(crate) config_file: String,

    /// Path to the warehouse service credential JSON file.
    #[arg(long, env = "KEY_FILE")]
    pub(crate) key_file: String,

    /// Number of accounts extracted concurrently.
    #[arg(long, default_value = DEFAULT_WORKERS, env = "WORKERS")]
    pub(crate) workers: usize,
}

/// Contents of the ads API config file. Values in the file can be overridden
/// with `ADS_`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    pub developer_token: String,

    pub access_token: String,

    #[serde(default)]
    pub login_customer_id: Option<String>,
}

fn default_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_string()
}

impl ApiConfig {
    pub fn load(path: &str) -> Result<Self, Error> {
        let loaded = Loader::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("ADS"))
            .build()?;

        Ok(loaded.try_deserialize()?)
    }
}
