//! The bidirectional forwarding loop.

mod session;

pub use session::{ExitReason, RelayOutcome, RelaySession};
