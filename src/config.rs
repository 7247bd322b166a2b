//! Service configuration from the environment.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::data::{BlobClient, DataSource};
use crate::error::AppError;
use crate::store::Backend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub dataset_name: String,
    pub actual_yields_name: String,
    pub store_name: String,
    pub sample_size: usize,
    pub sample_seed: u64,
    pub blob_container_url: Option<String>,
    pub blob_sas_token: Option<String>,
    pub auth_domain: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            data_dir: PathBuf::from("data"),
            dataset_name: "TestDataSet.csv".to_string(),
            actual_yields_name: "ActualMilkYields.csv".to_string(),
            store_name: "file.json".to_string(),
            sample_size: 300,
            sample_seed: 42,
            blob_container_url: None,
            blob_sas_token: None,
            auth_domain: None,
        }
    }
}

impl Config {
    /// Load from the process environment (after reading `.env`, if any).
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Config::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            port: try_load(&var, "PORT", defaults.port)?,
            data_dir: try_load(&var, "ICAR_DATA_DIR", defaults.data_dir.display())?,
            dataset_name: try_load(&var, "BLOB_DATASET_NAME", defaults.dataset_name)?,
            actual_yields_name: try_load(&var, "ACTUAL_YIELDS_NAME", defaults.actual_yields_name)?,
            store_name: try_load(&var, "STORE_NAME", defaults.store_name)?,
            sample_size: try_load(&var, "SAMPLE_SIZE", defaults.sample_size)?,
            sample_seed: try_load(&var, "SAMPLE_SEED", defaults.sample_seed)?,
            blob_container_url: var("BLOB_CONTAINER_URL"),
            blob_sas_token: var("BLOB_SAS_TOKEN"),
            auth_domain: var("AUTH_DOMAIN"),
        })
    }

    /// Directory generated test sets are written to and served from.
    pub fn generated_dir(&self) -> PathBuf {
        self.data_dir.join("generated")
    }

    fn blob_client(&self) -> Option<BlobClient> {
        self.blob_container_url
            .as_ref()
            .map(|url| BlobClient::new(url.clone(), self.blob_sas_token.clone()))
    }

    pub fn data_source(&self) -> DataSource {
        match self.blob_client() {
            Some(client) => DataSource::Blob(client),
            None => DataSource::Local(self.data_dir.clone()),
        }
    }

    pub fn store_backend(&self) -> Backend {
        match self.blob_client() {
            Some(client) => Backend::Blob {
                client,
                name: self.store_name.clone(),
            },
            None => Backend::File(self.data_dir.join(&self.store_name)),
        }
    }

    /// Token provider endpoint, when bearer validation is enabled.
    pub fn userinfo_url(&self) -> Option<String> {
        self.auth_domain.as_ref().map(|domain| {
            let domain = domain
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/');
            format!("https://{domain}/userinfo")
        })
    }
}

fn try_load<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: impl Display) -> Result<T, AppError>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        AppError::invalid_input(format!("Invalid {key} value '{raw}': {e}"))
    })
}
