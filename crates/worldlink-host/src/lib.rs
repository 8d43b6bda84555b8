//! The host side of worldlink: the block world and its update thread.
//!
//! The host world is stateful and single-threaded. Nothing on the
//! network side may touch it directly; instead every request crosses to
//! a dedicated update thread through a [`HostHandle`].
//!
//! # Key types
//!
//! - [`WorldHost`]: the trait a host world implements
//! - [`HostLoop`]: spawns the `host-update` thread that owns the world
//! - [`HostHandle`]: posts tasks to that thread and awaits replies
//! - [`StructureBuilder`]: turns a validated request into an ordered
//!   write plan
//! - [`MemoryWorld`]: in-memory reference world with a [`WorldProbe`]

mod builder;
mod config;
mod error;
mod host_loop;
mod memory;
mod world;

pub use builder::{
    BlockWrite, CLEAR_HEIGHT, MAX_SIZE, MIN_SIZE, StructureBuilder, StructurePlan,
    StructureReport, StructureSpec,
};
pub use config::HostConfig;
pub use error::HostError;
pub use host_loop::{HOST_THREAD_NAME, HostHandle, HostLoop, HostThread, StructureRequest};
pub use memory::{MemoryWorld, WorldProbe};
pub use world::{Block, BlockPos, HostInfo, WorldHost};
