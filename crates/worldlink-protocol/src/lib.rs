//! Wire protocol for worldlink.
//!
//! This crate defines what travels over a link:
//!
//! - **Types** ([`InboundMessage`], [`OutboundMessage`], [`MessageKind`]):
//!   the closed set of frames a peer may send and the replies it gets.
//! - **Frame parsing** ([`parse_frame`]): the rule that splits the two
//!   dialects sharing one channel: structured JSON objects and legacy
//!   plain-text instructions.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how outbound messages
//!   become text frames.
//! - **Errors** ([`ProtocolError`]): what can go wrong while parsing.
//!
//! The protocol layer knows nothing about sockets or the host world.
//!
//! ```text
//! Transport (text frames) → Protocol (InboundMessage) → Dispatcher
//! ```

mod codec;
mod error;
mod frame;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use frame::parse_frame;
pub use types::{
    CreateStructureRequest, DEFAULT_STRUCTURE_SIZE, DEFAULT_WORLD, InboundMessage,
    MessageKind, OutboundMessage, now_millis,
};
