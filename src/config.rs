use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ::config::{Config, Environment, File};
use serde::Deserialize;
use tasksync_core::normalize::DisplayZone;
use tasksync_core::store::{SheetsConfig, TokenSource};
use tracing::{debug, warn};

/// Every five minutes, on the minute.
pub const DEFAULT_SCHEDULE: &str = "0 */5 * * * *";

/// Older variable names that still work, mapped to their config key.
const LEGACY_ENV: [(&str, &str); 5] = [
    ("CANVAS_ICS_URL", "feed_url"),
    ("SPREADSHEET_URL", "store.spreadsheet"),
    ("GOOGLE_ACCESS_TOKEN", "store.access_token"),
    ("GOOGLE_SERVICE_ACCOUNT_EMAIL", "store.service_account_email"),
    ("GOOGLE_PRIVATE_KEY", "store.private_key"),
];

fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}

/// Settings loaded from ~/.config/tasksync/config.toml and the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Calendar feed to mirror
    #[serde(default)]
    pub feed_url: String,

    /// Cron expression, seconds first
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// IANA zone for rendered timestamps
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub spreadsheet: String,
    pub events_sheet: Option<String>,
    pub log_sheet: Option<String>,
    pub access_token: Option<String>,
    pub token_command: Option<String>,
    pub service_account_email: Option<String>,
    /// PEM private key of the service account
    pub private_key: Option<String>,
    pub api_base: Option<String>,
}

/// Get the config file path (~/.config/tasksync/config.toml)
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("tasksync");
    Ok(config_dir.join("config.toml"))
}

impl AppConfig {
    /// Load from `path` (or the default location) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).into_owned()),
            None => config_path()?,
        };
        debug!(path = %path.display(), exists = path.exists(), "loading config");

        Self::load_with_env(&path, std::env::vars().collect())
    }

    /// Load from a file plus an explicit set of environment variables.
    pub fn load_with_env(path: &Path, env: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix("TASKSYNC")
                    .prefix_separator("_")
                    .separator("__")
                    .source(Some(env.clone())),
            );

        for (name, key) in LEGACY_ENV {
            let value = env.get(name).filter(|v| !v.trim().is_empty()).cloned();
            builder = builder.set_override_option(key, value)?;
        }

        let config: AppConfig = builder
            .build()
            .with_context(|| format!("Could not read config from {}", path.display()))?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.feed_url.trim().is_empty() {
            bail!(
                "No calendar feed configured.\n\n\
                Set feed_url in {} or export CANVAS_ICS_URL.",
                path.display()
            );
        }
        if self.store.spreadsheet.trim().is_empty() {
            bail!(
                "No spreadsheet configured.\n\n\
                Set store.spreadsheet in {} or export SPREADSHEET_URL.",
                path.display()
            );
        }
        Ok(())
    }

    /// Zone used for every rendered timestamp.
    ///
    /// Falls back to the system zone by name, then to the process-local offset.
    pub fn display_zone(&self) -> Result<DisplayZone> {
        if let Some(name) = self.timezone.as_deref().filter(|n| !n.trim().is_empty()) {
            return DisplayZone::from_name(name.trim())
                .with_context(|| format!("Unknown time zone '{name}'"));
        }

        match iana_time_zone::get_timezone() {
            Ok(name) => match DisplayZone::from_name(&name) {
                Some(zone) => {
                    debug!(timezone = %name, "using system time zone");
                    Ok(zone)
                }
                None => {
                    warn!(timezone = %name, "system time zone not recognised; using local offset");
                    Ok(DisplayZone::Local)
                }
            },
            Err(e) => {
                warn!(error = %e, "could not determine system time zone; using local offset");
                Ok(DisplayZone::Local)
            }
        }
    }

    pub fn token_source(&self) -> Result<TokenSource> {
        let token = non_empty(&self.store.access_token);
        let command = non_empty(&self.store.token_command);
        let service_account = match (
            non_empty(&self.store.service_account_email),
            non_empty(&self.store.private_key),
        ) {
            (Some(email), Some(key)) => Some((email, key)),
            (None, None) => None,
            _ => bail!(
                "Service account credentials need both store.service_account_email \
                and store.private_key (GOOGLE_SERVICE_ACCOUNT_EMAIL / GOOGLE_PRIVATE_KEY)"
            ),
        };

        match (token, command, service_account) {
            (Some(token), None, None) => Ok(TokenSource::Static(token.to_string())),
            (None, Some(command), None) => Ok(TokenSource::from_command(command)),
            (None, None, Some((email, key))) => {
                debug!(service_account = email, "using service account credentials");
                Ok(TokenSource::from_service_account(email, key)?)
            }
            (None, None, None) => bail!(
                "No spreadsheet credentials configured.\n\n\
                Set store.service_account_email and store.private_key\n\
                (GOOGLE_SERVICE_ACCOUNT_EMAIL / GOOGLE_PRIVATE_KEY),\n\
                store.token_command (e.g. \"gcloud auth print-access-token\"),\n\
                or store.access_token / GOOGLE_ACCESS_TOKEN."
            ),
            _ => bail!(
                "Configure only one of store.access_token, store.token_command \
                or a service account"
            ),
        }
    }

    pub fn sheets_config(&self) -> SheetsConfig {
        SheetsConfig {
            spreadsheet: self.store.spreadsheet.trim().to_string(),
            events_sheet: non_empty(&self.store.events_sheet).map(String::from),
            log_sheet: non_empty(&self.store.log_sheet).map(String::from),
            api_base: non_empty(&self.store.api_base).map(String::from),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
