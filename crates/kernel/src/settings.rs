use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::index::IndexSpec;

const DEFAULT_ENV: &str = "development";
const ENV_VAR_NAME: &str = "CHANGEAPP_ENV";
const CONFIG_DIR_ENV: &str = "CHANGEAPP_CONFIG_DIR";
const ENV_PREFIX: &str = "CHANGEAPP";

/// Deployment environment. Selects the configuration overlay and labels each
/// logical database.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[serde(alias = "dev")]
    Development,
    Test,
    #[serde(alias = "hm")]
    Staging,
    #[serde(alias = "prod")]
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "staging" | "hm" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(anyhow!(
                "unsupported environment '{}'; expected development/test/staging/production",
                other
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub mongo: MongoSettings,
    #[serde(default)]
    pub provision: ProvisionSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

/// Explicit overrides for [`Settings::load_with`]; unset fields fall back to
/// `CHANGEAPP_ENV` / `CHANGEAPP_CONFIG_DIR`.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_dir: Option<PathBuf>,
    pub environment: Option<String>,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, and environment overlay.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(LoadOptions::default())
    }

    pub fn load_with(options: LoadOptions) -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = match options.environment {
            Some(environment) => environment,
            None => std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string()),
        };
        let environment: Environment = environment.parse()?;

        let config_dir = match options.config_dir {
            Some(dir) => dir,
            None => match std::env::var(CONFIG_DIR_ENV) {
                Ok(dir) => PathBuf::from(dir),
                Err(_) => std::env::current_dir()
                    .context("unable to resolve current directory")?
                    .join("config"),
            },
        };

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment));

        tracing::debug!(
            base = %base_path.display(),
            overlay = %environment_path.display(),
            "loading settings"
        );

        let builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        // The selected overlay is authoritative for the environment field.
        settings.environment = environment;

        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoSettings {
    #[serde(default = "MongoSettings::default_uri")]
    pub uri: String,
    #[serde(default = "MongoSettings::default_admin_database")]
    pub admin_database: String,
    #[serde(default = "MongoSettings::default_app_name")]
    pub app_name: String,
    #[serde(default = "MongoSettings::default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "MongoSettings::default_timeout_ms")]
    pub server_selection_timeout_ms: u64,
}

impl MongoSettings {
    fn default_uri() -> String {
        "mongodb://localhost:27017".to_string()
    }

    fn default_admin_database() -> String {
        "admin".to_string()
    }

    fn default_app_name() -> String {
        "changeapp-provision".to_string()
    }

    fn default_timeout_ms() -> u64 {
        5000
    }
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            uri: Self::default_uri(),
            admin_database: Self::default_admin_database(),
            app_name: Self::default_app_name(),
            connect_timeout_ms: Self::default_timeout_ms(),
            server_selection_timeout_ms: Self::default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionSettings {
    #[serde(default)]
    pub user: UserSettings,
    #[serde(default = "ProvisionSettings::default_databases")]
    pub databases: Vec<DatabaseTarget>,
    /// Per-collection overrides keyed by collection name
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionOverride>,
}

impl ProvisionSettings {
    fn default_databases() -> Vec<DatabaseTarget> {
        vec![
            DatabaseTarget::new("changeapp_transactions", Environment::Production),
            DatabaseTarget::new("changeapp_transactions_dev", Environment::Development),
            DatabaseTarget::new("changeapp_transactions_test", Environment::Test),
            DatabaseTarget::new("changeapp_transactions_hm", Environment::Staging),
        ]
    }
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            user: UserSettings::default(),
            databases: Self::default_databases(),
            collections: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct UserSettings {
    #[serde(default = "UserSettings::default_name")]
    pub name: String,
    #[serde(default = "UserSettings::default_password")]
    pub password: String,
    #[serde(default = "UserSettings::default_role")]
    pub role: String,
    /// Grant roles missing from an already existing user
    #[serde(default)]
    pub sync_roles: bool,
}

impl UserSettings {
    fn default_name() -> String {
        "changeapp".to_string()
    }

    fn default_password() -> String {
        "changeapp123".to_string()
    }

    fn default_role() -> String {
        "readWrite".to_string()
    }
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            password: Self::default_password(),
            role: Self::default_role(),
            sync_roles: false,
        }
    }
}

impl fmt::Debug for UserSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSettings")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .field("sync_roles", &self.sync_roles)
            .finish()
    }
}

/// One logical database to provision.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub name: String,
    pub environment: Environment,
    /// Records in this database use `transactionId` as `_id`, so indexes marked
    /// `superseded_by_id` are skipped and retired.
    #[serde(default)]
    pub id_as_primary_key: bool,
}

impl DatabaseTarget {
    pub fn new(name: impl Into<String>, environment: Environment) -> Self {
        Self {
            name: name.into(),
            environment,
            id_as_primary_key: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CollectionOverride {
    /// Replaces the owning module's default index set when present
    #[serde(default)]
    pub indexes: Option<Vec<IndexSpec>>,
    /// Index names to drop when found
    #[serde(default)]
    pub retired_indexes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "TelemetrySettings::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub filter: Option<String>,
}

impl TelemetrySettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_level: Self::default_log_level(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}
