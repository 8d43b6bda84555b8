//! Session tracking for worldlink listener connections.
//!
//! Every accepted connection gets one [`Session`] with a readable,
//! sequence-based id (`Client-1`, `Client-2`, …). The [`SessionRegistry`]
//! is the only structure in the link that several I/O tasks mutate at
//! once, so it sits on a concurrent map instead of a mutex-guarded one.
//!
//! ```text
//! Listener (above)  ← registers on accept, unregisters on close, fans out
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Transport Layer (below)  ← provides ConnectionId
//! ```

mod registry;
mod session;

pub use registry::{PeerHandle, SessionRegistry};
pub use session::{Session, SessionId};
