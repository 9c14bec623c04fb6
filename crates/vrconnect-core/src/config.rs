//! Proxy configuration management.
//!
//! Settings come from `~/.config/vrconnect/config.json` when it exists and
//! are then overridden by environment variables (a `.env` file is loaded by
//! the binary before this runs). The bot password is never read from the
//! config file: it comes from `VRCHAT_PASSWORD` or the OS keychain.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::{DEFAULT_API_BASE_URL, DEFAULT_USER_AGENT, REQUEST_TIMEOUT_SECS};
use crate::auth::session::{COOL_DOWN_SECS, SESSION_CHECK_INTERVAL_SECS};
use crate::auth::{CredentialStore, Credentials, GuardSettings};
use crate::proxy::GatewayOptions;

/// Application name used for config directory paths
const APP_NAME: &str = "vrconnect";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Port used when neither `VRCONNECT_BIND` nor `PORT` is set.
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub api_url: String,
    pub user_agent: String,
    pub username: Option<String>,
    pub session_check_secs: u64,
    pub cool_down_secs: u64,
    pub request_timeout_secs: u64,
    pub public_lookups: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", DEFAULT_PORT),
            api_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            username: None,
            session_check_secs: SESSION_CHECK_INTERVAL_SECS,
            cool_down_secs: COOL_DOWN_SECS,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            public_lookups: false,
        }
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    let secs: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds", key))?;
    anyhow::ensure!(secs > 0, "{} must be greater than zero", key);
    Ok(secs)
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("{} must be true or false, got {:?}", key, other)),
    }
}

impl Config {
    /// Load the config file (if any), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            debug!(path = %path.display(), "Loading config file");
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = get("VRCONNECT_BIND") {
            self.bind = bind;
        } else if let Some(port) = get("PORT") {
            let port: u16 = port.trim().parse().context("PORT must be a port number")?;
            self.bind = format!("0.0.0.0:{}", port);
        }
        if let Some(url) = get("VRCHAT_API_URL") {
            self.api_url = url;
        }
        if let Some(agent) = get("VRCHAT_USER_AGENT") {
            self.user_agent = agent;
        }
        if let Some(username) = get("VRCHAT_USERNAME") {
            self.username = Some(username);
        }
        if let Some(secs) = get("VRCONNECT_SESSION_CHECK_SECS") {
            self.session_check_secs = parse_secs("VRCONNECT_SESSION_CHECK_SECS", &secs)?;
        }
        if let Some(secs) = get("VRCONNECT_COOL_DOWN_SECS") {
            self.cool_down_secs = parse_secs("VRCONNECT_COOL_DOWN_SECS", &secs)?;
        }
        if let Some(secs) = get("VRCONNECT_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_secs("VRCONNECT_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(flag) = get("VRCONNECT_PUBLIC_LOOKUPS") {
            self.public_lookups = parse_flag("VRCONNECT_PUBLIC_LOOKUPS", &flag)?;
        }
        Ok(())
    }

    /// Resolve the bot credentials: password from the environment lookup,
    /// falling back to the OS keychain. Missing pieces yield incomplete
    /// credentials, which the session guard reports as a failed login.
    pub fn credentials(&self, lookup: impl Fn(&str) -> Option<String>) -> Credentials {
        let Some(username) = self.username.clone() else {
            return Credentials::default();
        };

        if let Some(password) = lookup("VRCHAT_PASSWORD").filter(|p| !p.is_empty()) {
            return Credentials::new(username, password);
        }

        match CredentialStore::load(&username) {
            Ok(credentials) => credentials,
            Err(e) => {
                debug!(error = %e, "No keychain password for bot account");
                Credentials::new(username, "")
            }
        }
    }

    pub fn guard_settings(&self) -> GuardSettings {
        GuardSettings {
            session_check_interval: Duration::from_secs(self.session_check_secs),
            cool_down: Duration::from_secs(self.cool_down_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            require_session_for_lookups: !self.public_lookups,
        }
    }
}
