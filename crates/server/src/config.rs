use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;
use serde::Deserialize;

const CONFIG_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub livekit_api_key: String,
    pub livekit_api_secret: String,
    /// Transport endpoint handed to clients with every credential.
    pub livekit_url: Option<String>,
    pub livekit_ttl_seconds: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8443".into(),
            database_url: "sqlite://./data/clubspaces.db".into(),
            livekit_api_key: "devkey".into(),
            livekit_api_secret: "devsecret".into(),
            livekit_url: None,
            livekit_ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    database_url: Option<String>,
    livekit_url: Option<String>,
    livekit_ttl_seconds: Option<i64>,
}

pub fn load_settings() -> Settings {
    let raw = fs::read_to_string(CONFIG_FILE).ok();
    let env: HashMap<String, String> = std::env::vars().collect();
    resolve_settings(raw.as_deref(), |key| env.get(key).cloned())
}

/// Defaults, then `server.toml`, then environment. `APP__*` keys win over the
/// bare names when both are set.
pub(crate) fn resolve_settings(
    file_contents: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(file_cfg) = file_contents.and_then(|raw| toml::from_str::<FileSettings>(raw).ok()) {
        if let Some(v) = file_cfg.bind_addr {
            settings.server_bind = v;
        }
        if let Some(v) = file_cfg.database_url {
            settings.database_url = v;
        }
        if let Some(v) = file_cfg.livekit_url {
            settings.livekit_url = Some(v);
        }
        if let Some(v) = file_cfg.livekit_ttl_seconds {
            settings.livekit_ttl_seconds = v;
        }
    }

    let lookup = |bare: &str, prefixed: &str| env(prefixed).or_else(|| env(bare));

    if let Some(v) = lookup("SERVER_BIND", "APP__BIND_ADDR") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("DATABASE_URL", "APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("LIVEKIT_API_KEY", "APP__LIVEKIT_API_KEY") {
        settings.livekit_api_key = v;
    }
    if let Some(v) = lookup("LIVEKIT_API_SECRET", "APP__LIVEKIT_API_SECRET") {
        settings.livekit_api_secret = v;
    }
    if let Some(v) = lookup("LIVEKIT_URL", "APP__LIVEKIT_URL") {
        settings.livekit_url = Some(v).filter(|url| !url.trim().is_empty());
    }
    if let Some(parsed) = env("APP__LIVEKIT_TTL_SECONDS").and_then(|v| v.parse::<i64>().ok()) {
        settings.livekit_ttl_seconds = parsed;
    }

    settings
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url)
        .replace('\\', "/");
    format!("sqlite://{path}")
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or_default();
    let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
