//! Load config from file and environment.

use std::path::PathBuf;

use serde::Deserialize;

/// Node configuration. File: ~/.config/loft/config.toml or
/// /etc/loft/config.toml. Env overrides: LOFT_LISTEN_ADDR,
/// LOFT_IDENTITY_PATH, LOFT_MAILBOX_DIR.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// TCP listen address for inbound streams (default 127.0.0.1:46100).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Identity record path (default ./loft_id.key).
    #[serde(default = "default_identity_path")]
    pub identity_path: PathBuf,
    /// Directory backing the key-value store (default ./loft-mailbox).
    #[serde(default = "default_mailbox_dir")]
    pub mailbox_dir: PathBuf,
    /// Per-value size ceiling for the mailbox backend in bytes.
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
}

fn default_listen_addr() -> String {
    "127.0.0.1:46100".to_string()
}
fn default_identity_path() -> PathBuf {
    PathBuf::from("loft_id.key")
}
fn default_mailbox_dir() -> PathBuf {
    PathBuf::from("loft-mailbox")
}
fn default_max_value_bytes() -> usize {
    loft_core::kv::DEFAULT_MAX_VALUE_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            identity_path: default_identity_path(),
            mailbox_dir: default_mailbox_dir(),
            max_value_bytes: default_max_value_bytes(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("LOFT_LISTEN_ADDR") {
        if !s.is_empty() {
            c.listen_addr = s;
        }
    }
    if let Ok(s) = std::env::var("LOFT_IDENTITY_PATH") {
        if !s.is_empty() {
            c.identity_path = PathBuf::from(s);
        }
    }
    if let Ok(s) = std::env::var("LOFT_MAILBOX_DIR") {
        if !s.is_empty() {
            c.mailbox_dir = PathBuf::from(s);
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/loft/config.toml"));
    }
    out.push(PathBuf::from("/etc/loft/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}
