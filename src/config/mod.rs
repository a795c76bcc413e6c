//! Configuration: controller credentials and server settings.
//!
//! Loaded from `config.toml` in the config directory (`SDWAN_MCP_CONFIG_DIR`
//! env → `~/.sdwan-mcp/`), then overridden from the environment. Credentials
//! are required for any command that talks to the controller; a missing value
//! is a startup-time fatal error with a message naming the field.

use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Upstream controller connection settings (`[controller]`).
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Gateway server configuration (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Upstream controller connection settings (`[controller]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Controller base URL (e.g. `"https://director.example.net:9183"`).
    /// Overridden by `SDWAN_MCP_URL` or `DIRECTOR_URL` env vars.
    #[serde(default)]
    pub base_url: String,
    /// OAuth client identifier. Overridden by `SDWAN_MCP_CLIENT_ID` or `VN_CLIENT_ID`.
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret. Overridden by `SDWAN_MCP_CLIENT_SECRET` or `VN_CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: String,
    /// Controller username. Overridden by `SDWAN_MCP_USERNAME` or `VN_USERNAME`.
    #[serde(default)]
    pub username: String,
    /// Controller password. Overridden by `SDWAN_MCP_PASSWORD` or `VN_PASSWORD`.
    #[serde(default)]
    pub password: String,
    /// Skip TLS certificate validation. Defaults to `true` because most
    /// deployments front the controller with a self-signed certificate;
    /// set to `false` when a trusted chain is available.
    #[serde(default = "default_true")]
    pub insecure_tls: bool,
    /// Per-request timeout, seconds. Default: `30`.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            insecure_tls: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port (default: 8080)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SDWAN_MCP_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let user_dirs = UserDirs::new().context("Could not determine home directory")?;
    Ok(user_dirs.home_dir().join(".sdwan-mcp"))
}

/// Read an env override, preferring the `SDWAN_MCP_*` name, falling back to
/// the legacy name used by earlier deployments.
fn env_override(primary: &str, legacy: &str) -> Option<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(legacy))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load `config.toml` from the config directory, creating a commented
    /// default file on first run, then apply env overrides.
    pub async fn load_or_init() -> Result<Self> {
        let dir = config_dir()?;
        let config_path = dir.join("config.toml");

        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            toml::from_str::<Config>(&contents).context("Failed to parse config file")?
        } else {
            let config = Config::default();
            let toml_str = toml::to_string_pretty(&config).context("Failed to serialize config")?;
            fs::write(&config_path, toml_str)
                .await
                .context("Failed to write default config file")?;

            // Credentials may land in this file; keep it private.
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }

            config
        };

        config.config_path = config_path;
        config.apply_env_overrides();
        tracing::info!(path = %config.config_path.display(), "Config loaded");
        Ok(config)
    }

    /// Apply environment variable overrides to config.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = env_override("SDWAN_MCP_URL", "DIRECTOR_URL") {
            self.controller.base_url = url;
        }
        if let Some(id) = env_override("SDWAN_MCP_CLIENT_ID", "VN_CLIENT_ID") {
            self.controller.client_id = id;
        }
        if let Some(secret) = env_override("SDWAN_MCP_CLIENT_SECRET", "VN_CLIENT_SECRET") {
            self.controller.client_secret = secret;
        }
        if let Some(username) = env_override("SDWAN_MCP_USERNAME", "VN_USERNAME") {
            self.controller.username = username;
        }
        if let Some(password) = env_override("SDWAN_MCP_PASSWORD", "VN_PASSWORD") {
            self.controller.password = password;
        }

        if let Ok(val) = std::env::var("SDWAN_MCP_INSECURE_TLS") {
            let normalized = val.trim().to_ascii_lowercase();
            match normalized.as_str() {
                "1" | "true" | "yes" | "on" => self.controller.insecure_tls = true,
                "0" | "false" | "no" | "off" => self.controller.insecure_tls = false,
                _ => {}
            }
        }

        // Gateway port: SDWAN_MCP_GATEWAY_PORT or PORT
        if let Ok(port_str) =
            std::env::var("SDWAN_MCP_GATEWAY_PORT").or_else(|_| std::env::var("PORT"))
        {
            if let Ok(port) = port_str.parse::<u16>() {
                self.gateway.port = port;
            }
        }
        if let Ok(host) = std::env::var("SDWAN_MCP_GATEWAY_HOST") {
            if !host.is_empty() {
                self.gateway.host = host;
            }
        }
    }

    /// Validate that every credential needed to reach the controller is set.
    ///
    /// Called by commands that open a controller session; the error names the
    /// first missing field so operators can fix the config or environment.
    pub fn validate_credentials(&self) -> Result<()> {
        let c = &self.controller;
        let missing = [
            ("controller.base_url (SDWAN_MCP_URL)", c.base_url.trim()),
            ("controller.client_id (SDWAN_MCP_CLIENT_ID)", c.client_id.trim()),
            (
                "controller.client_secret (SDWAN_MCP_CLIENT_SECRET)",
                c.client_secret.trim(),
            ),
            ("controller.username (SDWAN_MCP_USERNAME)", c.username.trim()),
            ("controller.password (SDWAN_MCP_PASSWORD)", c.password.trim()),
        ]
        .iter()
        .find(|(_, value)| value.is_empty())
        .map(|(name, _)| *name);

        if let Some(name) = missing {
            anyhow::bail!("Missing required configuration value: {name}");
        }

        if c.timeout_secs == 0 {
            anyhow::bail!("controller.timeout_secs must be greater than 0");
        }

        Ok(())
    }
}
