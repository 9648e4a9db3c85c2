//! Configuration handling for the memlink probe.
//!
//! Settings are read from the shared config file, then overridden by
//! environment variables and finally by command-line arguments.

use anyhow::Result;
use memlink_session::RemoteConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Which memory backend to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Companion process on a console, reached over TCP
    Nintendont,
    /// Emulator on this machine
    Emulator,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nintendont" | "network" => Ok(Self::Nintendont),
            "emulator" | "dolphin" => Ok(Self::Emulator),
            other => Err(format!(
                "unknown backend '{}', use 'nintendont' or 'emulator'",
                other
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nintendont => write!(f, "nintendont"),
            Self::Emulator => write!(f, "emulator"),
        }
    }
}

/// Memlink probe configuration
#[derive(Debug, Clone)]
pub struct MemlinkConfig {
    /// Companion host
    pub host: Option<String>,
    /// Backend to use
    pub backend: BackendKind,
    /// Settings of the network-attached client
    pub remote: RemoteConfig,
}

impl Default for MemlinkConfig {
    fn default() -> Self {
        Self {
            host: None,
            backend: BackendKind::Nintendont,
            remote: RemoteConfig::default(),
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    memlink: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    config: Option<HashMap<String, String>>,
}

impl MemlinkConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root_config) => {
                    config.apply_root_config(root_config);
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            }
        } else {
            warn!("Config file {:?} not found, using defaults", config_path.as_ref());
        }

        config.apply_environment_overrides(|key| std::env::var(key).ok());

        info!(
            "Memlink configuration: backend={}, host={:?}, port={}, timeout={:?}",
            config.backend, config.host, config.remote.port, config.remote.recv_timeout
        );

        Ok(config)
    }

    fn apply_root_config(&mut self, root_config: RootConfig) {
        let config_map = root_config
            .services
            .and_then(|services| services.memlink)
            .and_then(|service| service.config);

        let Some(config_map) = config_map else {
            return;
        };

        for (key, value) in config_map {
            match key.as_str() {
                "services.memlink.host" => {
                    self.host = Some(value).filter(|host| !host.is_empty());
                }
                "services.memlink.port" => {
                    if let Ok(port) = value.parse::<u16>() {
                        self.remote.port = port;
                    }
                }
                "services.memlink.backend" => match value.parse() {
                    Ok(backend) => self.backend = backend,
                    Err(e) => warn!("Ignoring services.memlink.backend: {}", e),
                },
                "services.memlink.timeout_ms" => {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.set_timeout(Duration::from_millis(ms));
                    }
                }
                "services.memlink.connect_timeout_ms" => {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.remote.connect_timeout = Duration::from_millis(ms);
                    }
                }
                "services.memlink.chunk_size" => {
                    if let Ok(size) = value.parse::<usize>() {
                        self.remote.chunk_size = size.clamp(1, 255);
                    }
                }
                _ => {
                    // Ignore unknown configuration keys
                }
            }
        }
    }

    /// Apply `MEMLINK_*` overrides looked up through `var`
    fn apply_environment_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("MEMLINK_HOST") {
            info!("Host overridden by environment: {}", host);
            self.host = Some(host);
        }

        if let Some(port) = var("MEMLINK_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.remote.port = port;
            info!("Port overridden by environment: {}", port);
        }

        if let Some(backend) = var("MEMLINK_BACKEND") {
            match backend.parse() {
                Ok(backend) => {
                    self.backend = backend;
                    info!("Backend overridden by environment: {}", backend);
                }
                Err(e) => warn!("Ignoring MEMLINK_BACKEND: {}", e),
            }
        }

        if let Some(ms) = var("MEMLINK_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.set_timeout(Duration::from_millis(ms));
            info!("Timeout overridden by environment: {}ms", ms);
        }
    }

    /// Set both the flush and the receive timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.remote.flush_timeout = timeout;
        self.remote.recv_timeout = timeout;
    }
}
