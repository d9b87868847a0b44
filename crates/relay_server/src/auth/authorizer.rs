//! The relay authorization decision.

use crate::auth::{AllowList, TargetRequest, TargetSpec};
use crate::config::AuthorizationPolicy;
use crate::connection::ConnectionId;
use tracing::{debug, error};

/// Result of an authorization check: the resolved target and the verdict.
///
/// A denial is a decision, not an error; the target is still reported so the
/// client can be told what was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub target: TargetSpec,
    pub allowed: bool,
    /// The path named no target and `target` is the default one.
    pub unparsed: bool,
}

impl Authorization {
    fn new(target: TargetSpec, allowed: bool) -> Self {
        Self {
            target,
            allowed,
            unparsed: false,
        }
    }

    fn allow(target: TargetSpec) -> Self {
        Self::new(target, true)
    }

    fn deny(target: TargetSpec) -> Self {
        Self::new(target, false)
    }
}

/// Evaluates requested paths against the [`AuthorizationPolicy`].
#[derive(Debug, Clone)]
pub struct ConnectionAuthorizer {
    policy: AuthorizationPolicy,
}

impl ConnectionAuthorizer {
    pub fn new(policy: AuthorizationPolicy) -> Self {
        Self { policy }
    }

    /// The configured default target.
    pub fn default_target(&self) -> TargetSpec {
        TargetSpec::new(self.policy.default_hostname.clone(), self.policy.default_port)
    }

    /// Decides whether the target named by `path` may be relayed to.
    ///
    /// # Rules
    ///
    /// * `/` is the default target and is always allowed.
    /// * A path that does not parse as `/host/port` is denied.
    /// * On the default host only the default port and the rlogin port are
    ///   allowed. The rlogin shortcut does not apply to any other host.
    /// * Any other host needs an allow-list entry. A missing, empty or
    ///   unreadable allow-list denies the request.
    pub async fn authorize(&self, path: &str, connection_id: ConnectionId) -> Authorization {
        let target = match TargetRequest::parse(path) {
            TargetRequest::Default => return Authorization::allow(self.default_target()),
            TargetRequest::Unparsed => {
                debug!(connection_id, "Path {:?} does not name a relay target", path);
                return Authorization {
                    unparsed: true,
                    ..Authorization::deny(self.default_target())
                };
            }
            TargetRequest::Custom(target) => target,
        };

        if target.has_host(&self.policy.default_hostname) {
            let allowed = target.port == self.policy.default_port
                || (self.policy.rlogin_port > 0 && target.port == self.policy.rlogin_port);
            return Authorization::new(target, allowed);
        }

        let Some(relay_file) = self.policy.relay_file.as_deref() else {
            return Authorization::deny(target);
        };

        match AllowList::load(relay_file).await {
            Ok(allow_list) => {
                let allowed = allow_list.permits(&target);
                Authorization::new(target, allowed)
            }
            Err(e) => {
                error!(connection_id, "{}", e);
                Authorization::deny(target)
            }
        }
    }
}
