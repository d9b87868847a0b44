//! The relay allow-list file.
//!
//! Format:
//!
//! ```text
//! 23,513
//! other.example.com:23
//! games.example.net:2323
//! ```
//!
//! The first line is a comma-separated list of ports that may be relayed to on
//! any host. Every following line names one allowed `host:port` pair. Entries
//! are compared case-insensitively after trimming.

use crate::auth::TargetSpec;
use crate::error::PolicyLoadError;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

/// Parsed contents of the allow-list file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    ports: HashSet<u16>,
    hosts: HashSet<String>,
}

impl AllowList {
    /// Reads and parses the allow-list.
    ///
    /// Not cached: every authorization check sees the file as it is on disk
    /// right now.
    pub async fn load(path: &Path) -> Result<Self, PolicyLoadError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PolicyLoadError::Missing(path.to_path_buf()));
            }
            Err(source) => {
                return Err(PolicyLoadError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Self::parse(&content).ok_or_else(|| PolicyLoadError::Empty(path.to_path_buf()))
    }

    /// Parses allow-list text. Returns `None` when there is no content at all.
    pub fn parse(content: &str) -> Option<Self> {
        if content.lines().all(|line| line.trim().is_empty()) {
            return None;
        }

        let mut lines = content.lines();
        let ports = lines
            .next()
            .unwrap_or_default()
            .split(',')
            .filter_map(|port| port.trim().parse::<u16>().ok())
            .filter(|port| *port > 0)
            .collect();

        let hosts = lines
            .map(|line| line.trim().to_ascii_lowercase())
            .filter(|line| !line.is_empty())
            .collect();

        Some(Self { ports, hosts })
    }

    /// True if the target's port is globally allowed or the exact
    /// `host:port` pair is listed.
    pub fn permits(&self, target: &TargetSpec) -> bool {
        if self.ports.contains(&target.port) {
            return true;
        }

        let requested = format!(
            "{}:{}",
            target.hostname.trim().to_ascii_lowercase(),
            target.port
        );
        self.hosts.contains(&requested)
    }

    pub fn allowed_ports(&self) -> &HashSet<u16> {
        &self.ports
    }

    pub fn allowed_hosts(&self) -> &HashSet<String> {
        &self.hosts
    }
}
