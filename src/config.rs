use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const CONFIG_ENV: &str = "MAILGLANCE_CONFIG";
pub const PORT_ENV: &str = "PORT";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub retrieval: RetrievalConfig,
    /// Mailbox listed by `GET /api/emails`. The password is never stored
    /// here; it comes from `IMAP_PASSWORD` at request time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// How many consecutive ports to try when the first one is taken.
    pub port_attempts: u16,
    pub body_limit_kb: usize,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RetrievalConfig {
    pub max_message_limit: usize,
    pub html_snippets: bool,
    pub trust_localhost_certs: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct AccountConfig {
    pub host: String,
    pub port: u16,
    pub use_encryption: bool,
    pub username: String,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(p));
        }
        let dir = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("no config dir"))?;
        Ok(dir.join("mailglance").join("config.toml"))
    }

    pub fn load_or_create() -> Result<(Self, bool, PathBuf)> {
        let path = Self::path()?;
        let (mut cfg, created) = Self::load_or_create_at(&path)?;
        if let Ok(port) = std::env::var(PORT_ENV) {
            cfg.server.port = port
                .parse()
                .with_context(|| format!("{PORT_ENV}={port} is not a port"))?;
        }
        Ok((cfg, created, path))
    }

    pub fn load_or_create_at(path: &Path) -> Result<(Self, bool)> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, DEFAULT_CONFIG)?;
            let cfg: Self = toml::from_str(DEFAULT_CONFIG)?;
            return Ok((cfg, true));
        }

        let data = fs::read_to_string(path)?;
        let cfg = toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        Ok((cfg, false))
    }
}

const DEFAULT_CONFIG: &str = r#"
[server]
bind = "127.0.0.1"
port = 4410
port_attempts = 5
body_limit_kb = 64

[retrieval]
max_message_limit = 500
html_snippets = false
trust_localhost_certs = true

# Uncomment to serve GET /api/emails for one fixed account.
# The password is read from the IMAP_PASSWORD environment variable.
# [account]
# host = "127.0.0.1"
# port = 1143
# use_encryption = true
# username = "you@email.ml"
"#;
