use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// fal.ai API key. Submissions and polling are refused while unset.
    #[serde(default)]
    pub fal_api_key: Option<String>,

    /// Queue root including the owner segment
    #[serde(default = "default_fal_base_url")]
    pub fal_base_url: String,

    /// Upper bound on every provider HTTP call
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Delay between reconciliation passes in the worker
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_fal_base_url() -> String {
    "https://queue.fal.run/fal-ai".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_reconcile_interval_secs() -> u64 {
    10
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// The API key, with blank values treated as unset.
    pub fn api_key(&self) -> Option<String> {
        self.fal_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }
}
