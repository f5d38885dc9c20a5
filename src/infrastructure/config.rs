use crate::application::retry::RetryPolicy;
use crate::application::session_controller::SessionPolicy;
use crate::domain::substance::{SubstanceCatalog, SubstanceConfig};
use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub source: SourceSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceSettings {
    pub endpoint: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_secs: u64,
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionSettings {
    pub idle_timeout_mins: u64,
    pub absolute_timeout_hours: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthSettings {
    #[serde(default)]
    pub users: Vec<UserCredential>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserCredential {
    pub email: String,
    /// Per-user random salt, hashed in front of the password
    pub salt: String,
    /// Hex SHA-256 of `salt` followed by the password
    pub password_sha256: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubstancesConfig {
    #[serde(default)]
    pub substances: Vec<SubstanceConfig>,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_attempts: 5,
            base_delay_ms: 1000,
            max_jitter_ms: 1000,
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_jitter_ms: self.max_jitter_ms,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_mins: 30,
            absolute_timeout_hours: 8,
        }
    }
}

impl SessionSettings {
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            idle_timeout: Duration::from_secs(self.idle_timeout_mins * 60),
            absolute_timeout: Duration::from_secs(self.absolute_timeout_hours * 60 * 60),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix("DASHBOARD")
        .prefix_separator("__")
        .separator("__")
}

pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard"))
        .add_source(env_source())
        .build()?;

    settings
        .try_deserialize()
        .context("Invalid dashboard configuration")
}

pub fn load_substance_catalog() -> anyhow::Result<SubstanceCatalog> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/substances"))
        .build()?;

    let parsed: SubstancesConfig = settings
        .try_deserialize()
        .context("Invalid substances configuration")?;
    Ok(SubstanceCatalog::new(parsed.substances)?)
}
