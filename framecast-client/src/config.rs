//! Configuration for the stream client.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use framecast_core::config::NUM_STREAMS;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Render servers in canonical stream order (index = stream id).
    pub servers: Vec<ServerEntry>,
    /// Display naming.
    pub display: DisplayConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// One render server endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    pub host: String,
    pub port: u16,
}

/// Display naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Title shown by the presenter.
    pub name: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: vec![
                ServerEntry {
                    host: "192.168.12.180".into(),
                    port: 3333,
                },
                ServerEntry {
                    host: "192.168.12.82".into(),
                    port: 3333,
                },
            ],
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            name: "framecast".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Resolve the configured servers into the fixed stream-ordered table.
    ///
    /// The list length must match the compiled stream count: stream ids are
    /// positions in this list.
    pub fn server_table(&self) -> Result<[SocketAddr; NUM_STREAMS], String> {
        if self.servers.len() != NUM_STREAMS {
            return Err(format!(
                "expected {NUM_STREAMS} servers, found {}",
                self.servers.len()
            ));
        }
        let mut table = Vec::with_capacity(NUM_STREAMS);
        for entry in &self.servers {
            let addr: SocketAddr = format!("{}:{}", entry.host, entry.port)
                .parse()
                .map_err(|e| format!("bad server address {}:{}: {e}", entry.host, entry.port))?;
            table.push(addr);
        }
        Ok(table.try_into().expect("length checked above"))
    }
}

// ── Tests ────────────────────────────────────────────────────────
