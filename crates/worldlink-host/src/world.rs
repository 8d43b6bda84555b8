//! The `WorldHost` trait: the boundary to the live block world.
//!
//! A host implementation is moved onto the `host-update` thread and is
//! only ever called from there, so it needs `Send` but not `Sync`.

use std::fmt;

/// A block coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// The block kinds the structure builder places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    /// Opaque floor material.
    Solid,
    /// Transparent wall and ceiling material.
    Glass,
    /// Light source.
    Light,
    /// Empty space.
    Air,
}

/// Host metadata reported through `get_server_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub name: String,
    pub version: String,
    pub online_players: u32,
    pub max_players: u32,
}

/// A live, single-threaded block world.
///
/// Every method is invoked on the host update thread.
pub trait WorldHost: Send + 'static {
    fn world_exists(&self, world: &str) -> bool;

    /// The `(x, z)` spawn column of `world`, if it exists.
    fn spawn_point(&self, world: &str) -> Option<(i32, i32)>;

    fn set_block(&mut self, world: &str, pos: BlockPos, block: Block);

    /// Runs a console-style instruction. Returns `false` if the host
    /// did not recognize or refused it.
    fn dispatch_command(&mut self, command: &str) -> bool;

    /// Shows a chat-style message to everyone in the world.
    fn announce(&mut self, message: &str);

    fn info(&self) -> HostInfo;

    /// Called once per tick after queued work has been applied.
    fn tick(&mut self, _tick: u64) {}
}
