//! Relay target authorization.
//!
//! Decides whether a requested `host:port` may be relayed to. The proxy only
//! ever connects to its configured default target, or to targets listed in
//! the administrator's allow-list file, so it cannot be used as an open relay.

pub mod allow_list;
pub mod authorizer;
pub mod target;

pub use allow_list::AllowList;
pub use authorizer::{Authorization, ConnectionAuthorizer};
pub use target::{TargetRequest, TargetSpec};
