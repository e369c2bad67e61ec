//! Application configuration: TOML file, `.env` and environment overrides.

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};

use spdedupe_core::ScannerConfig;
use spdedupe_graph::GraphConfig;

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP service listens on.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// App registration used for the client-credentials grant.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureAdConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for AzureAdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureAdConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub azure_ad: AzureAdConfig,
    pub graph: GraphConfig,
    pub scanner: ScannerConfig,
}

impl AppConfig {
    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("spdedupe").join("config.toml"))
    }

    /// Load the config file (explicit path, else the default location when it
    /// exists), then `.env`, then `SPDEDUPE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        // A missing .env is fine.
        let _ = dotenvy::dotenv();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply `SPDEDUPE_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("SPDEDUPE_TENANT_ID") {
            self.azure_ad.tenant_id = v;
        }
        if let Some(v) = var("SPDEDUPE_CLIENT_ID") {
            self.azure_ad.client_id = v;
        }
        if let Some(v) = var("SPDEDUPE_CLIENT_SECRET") {
            self.azure_ad.client_secret = v;
        }
        if let Some(v) = var("SPDEDUPE_API_BASE_URL") {
            self.graph.api_base_url = v;
        }
        if let Some(v) = var("SPDEDUPE_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = var("SPDEDUPE_MAX_PAGES_PER_DIRECTORY") {
            self.scanner.max_pages_per_directory = v
                .trim()
                .parse()
                .with_context(|| format!("SPDEDUPE_MAX_PAGES_PER_DIRECTORY is not a number: {v}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.scanner
            .validate()
            .map_err(|e| eyre!("Invalid [scanner] config: {e}"))
    }

    /// Tenant id, client id and client secret, all required to talk to Graph.
    pub fn credentials(&self) -> Result<(&str, &str, &str)> {
        let ad = &self.azure_ad;
        let missing: Vec<&str> = [
            ("tenant_id", &ad.tenant_id),
            ("client_id", &ad.client_id),
            ("client_secret", &ad.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(eyre!(
                "Missing [azure_ad] settings: {} (or SPDEDUPE_TENANT_ID, SPDEDUPE_CLIENT_ID, SPDEDUPE_CLIENT_SECRET)",
                missing.join(", ")
            ));
        }
        Ok((
            ad.tenant_id.as_str(),
            ad.client_id.as_str(),
            ad.client_secret.as_str(),
        ))
    }
}
