//! Plain-text instruction handling for worldlink.
//!
//! Instructions arrive as raw strings (`/say hello`). Before one may
//! touch the host it is:
//!
//! 1. **sanitized**: trimmed, color codes stripped, length capped,
//!    shell-style chaining rejected ([`CommandPolicy::sanitize`]);
//! 2. **authorized**: its name checked against the denylist, the fixed
//!    dangerous set and the allowlist ([`CommandPolicy::check`]);
//! 3. **marshaled** onto the host update thread ([`CommandExecutor`]).
//!
//! The policy is immutable once built and shared behind an `Arc`.

mod error;
mod executor;
mod policy;

pub use error::{CommandError, PolicyViolation};
pub use executor::{CommandExecutor, ExecutedCommand};
pub use policy::{CommandPolicy, DANGEROUS_COMMANDS, PolicyConfig};
