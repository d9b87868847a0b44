//! Append-only audit log of proxied connections.
//!
//! One ASCII line per connection that reaches the authorization step (pings
//! and policy probes are not recorded):
//!
//! ```text
//! timestamp<TAB>client ip<TAB>client port<TAB>path<TAB>protocol<TAB>sub-protocol<CR><LF>
//! ```

use crate::error::ServerError;
use chrono::{DateTime, Local};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub timestamp: DateTime<Local>,
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub path: String,
    pub protocol: String,
    pub sub_protocol: String,
}

impl AuditRecord {
    /// Renders the record as a single CRLF-terminated, ASCII-only line.
    ///
    /// Characters outside of ASCII are replaced with `?`.
    pub fn to_line(&self) -> String {
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\r\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.client_ip,
            self.client_port,
            self.path,
            self.protocol,
            self.sub_protocol
        );
        line.chars()
            .map(|c| if c.is_ascii() { c } else { '?' })
            .collect()
    }
}

/// Appends [`AuditRecord`]s to a file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, creating the file if needed.
    pub async fn append(&self, record: &AuditRecord) -> Result<(), ServerError> {
        let line = record.to_line();
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        result.map_err(|source| ServerError::Audit {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(path: &str) -> AuditRecord {
        AuditRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            client_ip: "203.0.113.9".parse().unwrap(),
            client_port: 50412,
            path: path.to_string(),
            protocol: "RFC6455".to_string(),
            sub_protocol: "plain".to_string(),
        }
    }

    #[test]
    fn test_line_format() {
        assert_eq!(
            record("/bbs.example.com/23").to_line(),
            "2024-03-09 14:05:07\t203.0.113.9\t50412\t/bbs.example.com/23\tRFC6455\tplain\r\n"
        );
    }

    #[test]
    fn test_line_is_ascii_only() {
        let line = record("/bücher.example/23").to_line();
        assert!(line.is_ascii());
        assert!(line.contains("/b?cher.example/23"));
    }

    #[tokio::test]
    async fn test_append_keeps_previous_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("connections.log"));

        log.append(&record("/")).await.unwrap();
        log.append(&record("/other.example.com/23")).await.unwrap();

        let content = tokio::fs::read_to_string(log.path()).await.unwrap();
        let lines: Vec<&str> = content.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("\t/\tRFC6455\tplain"));
        assert!(lines[1].contains("\t/other.example.com/23\t"));
    }

    #[tokio::test]
    async fn test_append_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("no-such-dir").join("connections.log"));

        let result = log.append(&record("/")).await;
        assert!(matches!(result, Err(ServerError::Audit { .. })));
    }
}
