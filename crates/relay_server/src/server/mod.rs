//! Core server implementation and connection handling.
//!
//! This module contains the relay server structure with its accept loop and
//! the per-connection handling logic.

pub mod core;
pub mod handlers;

pub use core::RelayServer;
pub use handlers::{HandlerContext, LineRead, PING_ACK, PING_PATH};
