//! Requested relay targets and path parsing.

use std::fmt;

/// A relay destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetSpec {
    pub hostname: String,
    pub port: u16,
}

impl TargetSpec {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Case-insensitive hostname comparison, ignoring surrounding whitespace.
    pub fn has_host(&self, hostname: &str) -> bool {
        self.hostname.trim().eq_ignore_ascii_case(hostname.trim())
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// What the client asked for through the WebSocket request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRequest {
    /// `/` - the configured default target
    Default,
    /// `/host/port`
    Custom(TargetSpec),
    /// Any other path; never relayed
    Unparsed,
}

impl TargetRequest {
    /// Parses a request path.
    ///
    /// Only `/` and paths of the exact shape `/host/port` (three segments when
    /// split on `/`, the last a port in `1..=65535`) carry a target.
    pub fn parse(path: &str) -> Self {
        if path == "/" {
            return Self::Default;
        }

        let segments: Vec<&str> = path.split('/').collect();
        if let [_, host, port] = segments.as_slice() {
            let host = host.trim();
            match port.trim().parse::<u16>() {
                Ok(port) if port > 0 && !host.is_empty() => {
                    return Self::Custom(TargetSpec::new(host, port));
                }
                _ => {}
            }
        }

        Self::Unparsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path_is_default() {
        assert_eq!(TargetRequest::parse("/"), TargetRequest::Default);
    }

    #[test]
    fn test_host_and_port_path() {
        assert_eq!(
            TargetRequest::parse("/bbs.example.com/513"),
            TargetRequest::Custom(TargetSpec::new("bbs.example.com", 513))
        );
    }

    #[test]
    fn test_hostname_is_trimmed() {
        assert_eq!(
            TargetRequest::parse("/ bbs.example.com /23"),
            TargetRequest::Custom(TargetSpec::new("bbs.example.com", 23))
        );
    }

    #[test]
    fn test_unparsed_paths() {
        let cases = [
            "",
            "/ping/extra/segments",
            "/bbs.example.com",
            "/bbs.example.com/",
            "/bbs.example.com/telnet",
            "/bbs.example.com/0",
            "/bbs.example.com/-23",
            "/bbs.example.com/70000",
            "/bbs.example.com/23/",
            "//23",
            "bbs.example.com/23",
        ];

        for path in cases {
            assert_eq!(
                TargetRequest::parse(path),
                TargetRequest::Unparsed,
                "path {path:?} should not yield a target"
            );
        }
    }

    #[test]
    fn test_has_host_ignores_case_and_whitespace() {
        let target = TargetSpec::new("BBS.Example.com", 23);
        assert!(target.has_host("  bbs.example.COM "));
        assert!(!target.has_host("bbs.example.org"));
    }

    #[test]
    fn test_display() {
        assert_eq!(TargetSpec::new("host", 2323).to_string(), "host:2323");
    }
}
