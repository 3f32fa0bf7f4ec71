use crate::model::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_API_PREFIX: &str = "/api/v1/admin/media";
/// Matches the ingestion endpoint's own limit.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub server_url: Option<String>,
    pub api_prefix: Option<String>,
    pub token: Option<String>,
    pub page_size: Option<u32>,
    pub max_upload_bytes: Option<u64>,
}

impl Config {
    pub fn config_path() -> anyhow::Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "mediadesk", "mediadesk")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    /// Load the config file, then apply `MEDIADESK_SERVER` / `MEDIADESK_TOKEN`.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_toml(&content)?
        } else {
            Config::default()
        };
        config.apply_overrides(
            std::env::var("MEDIADESK_SERVER").ok(),
            std::env::var("MEDIADESK_TOKEN").ok(),
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, server_url: Option<String>, token: Option<String>) {
        if let Some(server) = server_url.filter(|s| !s.trim().is_empty()) {
            self.server_url = Some(normalize_server_url(&server));
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.token = Some(token.trim().to_string());
        }
    }

    pub fn require_auth(&self) -> anyhow::Result<()> {
        if self.server_url.is_none() {
            anyhow::bail!("No server configured. Run: mediadesk configure --server <url>");
        }
        if self.token.is_none() {
            anyhow::bail!("No access token. Run: mediadesk configure --token <token>");
        }
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.token.is_some()
    }

    pub fn api_prefix(&self) -> &str {
        self.api_prefix.as_deref().unwrap_or(DEFAULT_API_PREFIX)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn max_upload_bytes(&self) -> Option<u64> {
        match self.max_upload_bytes {
            Some(0) => None,
            Some(limit) => Some(limit),
            None => Some(DEFAULT_MAX_UPLOAD_BYTES),
        }
    }
}

/// Add http:// if missing and drop trailing slashes.
pub fn normalize_server_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}
