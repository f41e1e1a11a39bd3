//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.apigw-bridge/config.json`) and environment.
//! Environment variables win over the file.

use crate::dispatch::Dispatcher;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const ENV_CONFIG_PATH: &str = "APIGW_BRIDGE_CONFIG_PATH";
const ENV_PORT: &str = "APIGW_BRIDGE_PORT";
const ENV_BINARY_MIME_TYPES: &str = "APIGW_BRIDGE_BINARY_MIME_TYPES";

/// Top-level config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Port of the HTTP server on 127.0.0.1. Overridden by APIGW_BRIDGE_PORT.
    pub port: Option<u16>,

    /// Content types whose responses are base64-encoded (e.g. "image/png").
    /// Overridden by APIGW_BRIDGE_BINARY_MIME_TYPES (comma-separated).
    #[serde(default)]
    pub binary_mime_types: Vec<String>,

    /// Whole-request timeout for the transport client, in milliseconds. No timeout when absent.
    pub timeout_ms: Option<u64>,
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the target port: env APIGW_BRIDGE_PORT overrides config.
/// An unparseable env value is ignored with a warning.
pub fn resolve_port(config: &Config) -> Option<u16> {
    env_non_empty(ENV_PORT)
        .and_then(|s| match s.parse::<u16>() {
            Ok(p) => Some(p),
            Err(_) => {
                log::warn!("ignoring {}={:?}: not a port number", ENV_PORT, s);
                None
            }
        })
        .or(config.port)
}

/// Resolve binary MIME types: env APIGW_BRIDGE_BINARY_MIME_TYPES overrides config.
pub fn resolve_binary_mime_types(config: &Config) -> Vec<String> {
    match env_non_empty(ENV_BINARY_MIME_TYPES) {
        Some(list) => parse_mime_list(&list),
        None => config.binary_mime_types.clone(),
    }
}

fn parse_mime_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var(ENV_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".apigw-bridge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (or APIGW_BRIDGE_CONFIG_PATH).
/// Missing file => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Build a dispatcher from resolved config. `port_override` (e.g. a CLI flag) beats env and
/// file. Fails when no port is configured anywhere.
pub fn build_dispatcher(config: &Config, port_override: Option<u16>) -> Result<Dispatcher> {
    let port = port_override.or_else(|| resolve_port(config)).with_context(|| {
        format!("no target port configured (set \"port\" in config or {})", ENV_PORT)
    })?;
    let mut builder = reqwest::Client::builder().no_proxy();
    if let Some(ms) = config.timeout_ms {
        builder = builder.timeout(Duration::from_millis(ms));
    }
    let client = builder.build().context("building http client")?;
    Ok(Dispatcher::new(port)
        .with_client(client)
        .with_binary_mime_types(resolve_binary_mime_types(config)))
}
