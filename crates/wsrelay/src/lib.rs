//! # wsrelay - WebSocket to Telnet Relay Proxy
//!
//! Lets browser terminals reach telnet and rlogin services. The proxy accepts
//! WebSocket connections, checks the requested `host:port` against its
//! policy, and relays bytes to the backend. This crate is the runnable
//! service around [`relay_server`]: CLI parsing, configuration loading,
//! logging, signal handling and application lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! wsrelay
//!
//! # Specify custom configuration
//! wsrelay --config production.toml
//!
//! # Override specific settings
//! wsrelay --bind 0.0.0.0:1123 --target bbs.example.com:23 --log-level debug
//!
//! # JSON logging for production
//! wsrelay --json-logs
//! ```
//!
//! ## Configuration
//!
//! The proxy loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The proxy handles graceful shutdown on:
//! - SIGINT (Ctrl+C)
//! - SIGTERM (Unix systems)
//!
//! Running relays are told the proxy is shutting down before they close. A
//! second signal exits immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the proxy: parses the command line, sets up logging and runs the
/// application until shutdown.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the file, before it is validated
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

pub use config::{AuditSettings, LoggingSettings, ServerSettings, TargetSettings, TlsFileSettings};
