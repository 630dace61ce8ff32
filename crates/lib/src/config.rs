//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.gateview/config.json`).
//! Missing file means defaults; CLI flags override individual fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Serial link to the gate controller.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Credential table location.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Gateway bind, port, and static content root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Directory the plain-HTTP path serves files from.
    #[serde(default = "default_doc_root")]
    pub doc_root: PathBuf,
}

/// Serial port name and speed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialConfig {
    /// Device path, e.g. "/dev/ttyUSB0" or "COM3". Required to start the
    /// gateway (config or --device flag).
    pub device: Option<String>,

    /// Baud rate (default 115200).
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Where the credential table lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Auth table file. Required to start the gateway (config or
    /// --auth-file flag).
    pub table_path: Option<PathBuf>,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_doc_root() -> PathBuf {
    PathBuf::from("./client")
}

fn default_baud_rate() -> u32 {
    115200
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            doc_root: default_doc_root(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: None,
            baud_rate: default_baud_rate(),
        }
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("GATEVIEW_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".gateview").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file =>
/// default config.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(default_config_path);
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}
