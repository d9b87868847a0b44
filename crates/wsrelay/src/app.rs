//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that orchestrates proxy
//! startup, periodic status reports and the graceful shutdown drain.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{wait_for_shutdown_signal, wait_for_signal},
};
use relay_server::{connection::ConnectionRegistry, RelayServer, ShutdownState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often live connections are reported.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// How long running relays get to deliver their shutdown notice.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Main application struct.
///
/// The `Application` manages the complete lifecycle of the proxy, including
/// configuration loading, server initialization, status monitoring and
/// graceful shutdown handling.
///
/// # Architecture
///
/// * **Configuration Management**: Loads and validates configuration from files and CLI
/// * **Server Orchestration**: Initializes and runs the relay server
/// * **Status Monitoring**: Reports live connections every minute
/// * **Graceful Shutdown**: Stops accepting, lets relays say goodbye, then exits
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Where the configuration came from
    config_path: PathBuf,
    /// Relay server instance
    server: RelayServer,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Initialize the relay server with configuration
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        apply_overrides(&mut config, &args)?;

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server = RelayServer::new(config.to_server_config()?);

        Ok(Self {
            config,
            config_path: args.config_path,
            server,
        })
    }

    /// Runs the proxy until a shutdown signal arrives.
    ///
    /// # Shutdown
    ///
    /// The first signal stops the accept loop and every running relay. Relays
    /// then show their shutdown notice, and the application waits up to
    /// five seconds for the connection registry to empty. A second signal
    /// exits at once.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.log_configuration_summary();

        let shutdown_state = ShutdownState::new();
        let registry = self.server.get_registry();
        let listener = self.server.bind().await?;

        let mut server_handle = {
            let server = self.server;
            let shutdown_state = shutdown_state.clone();
            tokio::spawn(async move { server.serve(listener, shutdown_state).await })
        };

        let monitoring_handle = {
            let registry = registry.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(STATUS_INTERVAL);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    log_status(&registry);
                }
            })
        };

        info!("✅ wsrelay is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            result = &mut server_handle => {
                monitoring_handle.abort();
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(e) => Err(format!("Server task failed: {e}").into()),
                };
            }
            result = wait_for_shutdown_signal(&shutdown_state) => result?,
        }

        tokio::spawn(async {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up second shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again! Exiting immediately.");
            std::process::exit(1);
        });

        monitoring_handle.abort();

        info!("🧹 Stopping accept loop...");
        match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
            Ok(Ok(Ok(()))) => info!("✅ Accept loop stopped"),
            Ok(Ok(Err(e))) => error!("❌ Server error during shutdown: {}", e),
            Ok(Err(e)) => error!("❌ Server task failed: {}", e),
            Err(_) => warn!("⏰ Accept loop did not stop within {:?}", DRAIN_TIMEOUT),
        }

        info!("⏳ Waiting for {} connection(s) to close...", registry.len());
        if drain(&registry, DRAIN_TIMEOUT).await {
            info!("✅ All connections closed");
        } else {
            warn!(
                "⏰ {} connection(s) still open after {:?}, exiting anyway",
                registry.len(),
                DRAIN_TIMEOUT
            );
            log_status(&registry);
        }

        info!("✅ wsrelay shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary ({}):", self.config_path.display());
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!(
            "  🎯 Default target: {}:{}",
            self.config.target.hostname, self.config.target.port
        );
        if self.config.target.rlogin_port > 0 {
            info!("  📟 rlogin port: {}", self.config.target.rlogin_port);
        }
        if self.config.target.relay_file.trim().is_empty() {
            info!("  📄 Relay allow-list: disabled");
        } else {
            info!("  📄 Relay allow-list: {}", self.config.target.relay_file);
        }
        info!("  📝 Audit log: {}", self.config.audit.path);
        info!("  🔒 TLS: {}", if self.config.tls.enabled { "enabled" } else { "disabled" });
        info!("  👥 Max connections: {}", self.config.server.max_connections);
    }
}

/// Applies CLI overrides on top of the file configuration.
pub fn apply_overrides(config: &mut AppConfig, args: &CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }

    if let Some(target) = &args.target {
        config.set_target(target)?;
    }

    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }

    if args.json_logs {
        config.logging.json_format = true;
    }

    Ok(())
}

fn log_status(registry: &ConnectionRegistry) {
    info!("📊 {} active connection(s)", registry.len());
    for summary in registry.summaries() {
        debug!("  {}", summary);
    }
}

/// Waits until the registry is empty or `timeout` passes. Returns true if
/// it emptied.
async fn drain(registry: &Arc<ConnectionRegistry>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !registry.is_empty() {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
    true
}
