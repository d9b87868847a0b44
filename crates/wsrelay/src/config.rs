//! Configuration management for the wsrelay proxy.
//!
//! This module handles loading, validation, and conversion of the proxy
//! configuration from TOML files and command-line arguments.

use relay_server::{AuthorizationPolicy, ServerConfig, TlsSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure that encompasses all proxy
/// settings: networking, the relay target policy, the audit log, TLS and
/// logging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listener and timeout settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Default relay target and allow-list
    #[serde(default)]
    pub target: TargetSettings,
    /// Connection audit log
    #[serde(default)]
    pub audit: AuditSettings,
    /// TLS for `wss://`
    #[serde(default)]
    pub tls: TlsFileSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Listener-specific configuration settings.
///
/// Controls network binding, connection limits and the timeouts of the
/// connection handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the proxy to (e.g., "0.0.0.0:1123")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// WebSocket and TLS handshake timeout in milliseconds
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Target connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Pause after a final notice to the user, in milliseconds
    #[serde(default = "default_notice_delay_ms")]
    pub notice_delay_ms: u64,
    /// How long `/ping` waits for a line, in milliseconds
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

/// Relay target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSettings {
    /// Host relayed to for `/`
    pub hostname: String,
    /// Port relayed to for `/`
    pub port: u16,
    /// Second port allowed on the default host (0 disables it)
    #[serde(default = "default_rlogin_port")]
    pub rlogin_port: u16,
    /// Allow-list file for other targets; empty disables it
    #[serde(default)]
    pub relay_file: String,
}

/// Audit log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// File that connection records are appended to
    pub path: String,
}

/// TLS listener configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsFileSettings {
    /// Whether the listener speaks `wss://`
    #[serde(default)]
    pub enabled: bool,
    /// PEM certificate chain
    #[serde(default)]
    pub cert_path: String,
    /// PEM private key
    #[serde(default)]
    pub key_path: String,
}

/// Logging system configuration.
///
/// Controls log output format and level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

/// Default for max_connections
fn default_max_connections() -> usize {
    1000
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_notice_delay_ms() -> u64 {
    2500
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

fn default_rlogin_port() -> u16 {
    513
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:1123".to_string(),
            max_connections: default_max_connections(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            notice_delay_ms: default_notice_delay_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
        }
    }
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 23,
            rlogin_port: default_rlogin_port(),
            relay_file: String::new(),
        }
    }
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            path: "connections.log".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if loading/creation failed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies a `HOST:PORT` override of the default target.
    pub fn set_target(&mut self, target: &str) -> Result<(), String> {
        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| format!("Invalid target '{target}', expected HOST:PORT"))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("Invalid port in target '{target}'"))?;

        self.target.hostname = host.trim().to_string();
        self.target.port = port;
        Ok(())
    }

    /// Converts the application configuration to a relay server configuration.
    ///
    /// # Returns
    ///
    /// A `ServerConfig` instance ready for use with the relay server.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let relay_file = match self.target.relay_file.trim() {
            "" => None,
            path => Some(PathBuf::from(path)),
        };
        let tls = self.tls.enabled.then(|| TlsSettings {
            cert_path: PathBuf::from(&self.tls.cert_path),
            key_path: PathBuf::from(&self.tls.key_path),
        });

        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            handshake_timeout_ms: self.server.handshake_timeout_ms,
            connect_timeout_ms: self.server.connect_timeout_ms,
            notice_delay_ms: self.server.notice_delay_ms,
            ping_timeout_ms: self.server.ping_timeout_ms,
            policy: AuthorizationPolicy {
                default_hostname: self.target.hostname.trim().to_string(),
                default_port: self.target.port,
                rlogin_port: self.target.rlogin_port,
                relay_file,
            },
            audit_log_path: PathBuf::from(&self.audit.path),
            tls,
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }

        if self.target.hostname.trim().is_empty() {
            return Err("Target hostname cannot be empty".to_string());
        }

        if self.target.port == 0 {
            return Err("Target port must be greater than 0".to_string());
        }

        if self.audit.path.trim().is_empty() {
            return Err("Audit log path cannot be empty".to_string());
        }

        if self.tls.enabled && (self.tls.cert_path.is_empty() || self.tls.key_path.is_empty()) {
            return Err("TLS is enabled but cert_path or key_path is missing".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "0.0.0.0:1123");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.server.notice_delay_ms, 2500);
        assert_eq!(config.server.ping_timeout_ms, 1000);
        assert_eq!(config.target.hostname, "localhost");
        assert_eq!(config.target.port, 23);
        assert_eq!(config.target.rlogin_port, 513);
        assert!(config.target.relay_file.is_empty());
        assert_eq!(config.audit.path, "connections.log");
        assert!(!config.tls.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:1123");

        // The default file is written and can be read back
        assert!(path.exists());
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.target.port, 23);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[server]
bind_address = "127.0.0.1:8023"
max_connections = 50
notice_delay_ms = 1000

[target]
hostname = "bbs.example.com"
port = 2323
rlogin_port = 0
relay_file = "relay.txt"

[audit]
path = "/var/log/wsrelay/connections.log"

[tls]
enabled = true
cert_path = "cert.pem"
key_path = "key.pem"

[logging]
level = "debug"
json_format = true
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.server.bind_address, "127.0.0.1:8023");
        assert_eq!(config.server.max_connections, 50);
        assert_eq!(config.server.notice_delay_ms, 1000);
        // Not in the file
        assert_eq!(config.server.connect_timeout_ms, 10_000);
        assert_eq!(config.target.hostname, "bbs.example.com");
        assert_eq!(config.target.rlogin_port, 0);
        assert_eq!(config.audit.path, "/var/log/wsrelay/connections.log");
        assert!(config.tls.enabled);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: AppConfig = toml::from_str("[target]\nhostname = \"bbs.example.com\"\nport = 23\n").unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:1123");
        assert_eq!(config.target.rlogin_port, 513);
        assert_eq!(config.audit.path, "connections.log");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_server_config_conversion() {
        let mut config = AppConfig::default();
        config.target.hostname = " BBS.example.com ".to_string();
        config.target.relay_file = "relay.txt".to_string();

        let server_config = config.to_server_config().unwrap();
        assert_eq!(server_config.bind_address.port(), 1123);
        assert_eq!(server_config.policy.default_hostname, "BBS.example.com");
        assert_eq!(server_config.policy.relay_file, Some(PathBuf::from("relay.txt")));
        assert_eq!(server_config.audit_log_path, PathBuf::from("connections.log"));
        assert!(server_config.tls.is_none());

        config.target.relay_file = "   ".to_string();
        config.tls = TlsFileSettings {
            enabled: true,
            cert_path: "cert.pem".to_string(),
            key_path: "key.pem".to_string(),
        };
        let server_config = config.to_server_config().unwrap();
        assert!(server_config.policy.relay_file.is_none());
        assert_eq!(
            server_config.tls.unwrap().cert_path,
            PathBuf::from("cert.pem")
        );
    }

    #[test]
    fn test_set_target() {
        let mut config = AppConfig::default();
        config.set_target("bbs.example.com:2323").unwrap();
        assert_eq!(config.target.hostname, "bbs.example.com");
        assert_eq!(config.target.port, 2323);

        assert!(config.set_target("no-port").is_err());
        assert!(config.set_target("host:telnet").is_err());
    }

    #[test]
    fn test_validation_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_target() {
        let mut config = AppConfig::default();
        config.target.hostname = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.target.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_empty_audit_path() {
        let mut config = AppConfig::default();
        config.audit.path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_tls_requires_files() {
        let mut config = AppConfig::default();
        config.tls.enabled = true;
        config.tls.cert_path = "cert.pem".to_string();
        assert!(config.validate().is_err());

        config.tls.key_path = "key.pem".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_log_levels() {
        let mut config = AppConfig::default();
        for level in ["trace", "debug", "info", "warn", "error"] {
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok());
        }

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
