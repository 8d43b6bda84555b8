//! In-memory block world.
//!
//! `MemoryWorld` is the host used by the demo binary and by tests. It
//! stores blocks in hash maps and records every interaction in a
//! [`WorldProbe`], which stays readable from other threads after the
//! world itself has been moved onto the update thread.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::{Block, BlockPos, HostInfo, WorldHost};

/// Shared, thread-safe record of what happened to a [`MemoryWorld`].
#[derive(Debug, Clone, Default)]
pub struct WorldProbe {
    inner: Arc<ProbeState>,
}

#[derive(Debug, Default)]
struct ProbeState {
    writes: AtomicUsize,
    ticks: AtomicU64,
    commands: Mutex<Vec<String>>,
    announcements: Mutex<Vec<String>>,
    writer_threads: Mutex<HashSet<String>>,
}

impl WorldProbe {
    /// Total `set_block` calls so far.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::SeqCst)
    }

    /// Every instruction passed to `dispatch_command`, in order.
    pub fn commands(&self) -> Vec<String> {
        self.inner
            .commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn announcements(&self) -> Vec<String> {
        self.inner
            .announcements
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    /// Names of every thread that mutated the world.
    pub fn writer_threads(&self) -> HashSet<String> {
        self.inner
            .writer_threads
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    fn record_writer(&self) {
        let name = std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string();
        if let Ok(mut threads) = self.inner.writer_threads.lock() {
            threads.insert(name);
        }
    }
}

#[derive(Debug)]
struct Dimension {
    spawn: (i32, i32),
    blocks: HashMap<BlockPos, Block>,
}

/// A block world held entirely in memory.
#[derive(Debug)]
pub struct MemoryWorld {
    dimensions: HashMap<String, Dimension>,
    rejected: HashSet<String>,
    online_players: u32,
    max_players: u32,
    probe: WorldProbe,
}

impl MemoryWorld {
    /// A host with one world named `world`, spawn at the origin.
    pub fn new() -> Self {
        Self {
            dimensions: HashMap::new(),
            rejected: HashSet::new(),
            online_players: 0,
            max_players: 20,
            probe: WorldProbe::default(),
        }
        .with_world("world", (0, 0))
    }

    pub fn with_world(mut self, name: &str, spawn: (i32, i32)) -> Self {
        self.dimensions.insert(
            name.to_string(),
            Dimension {
                spawn,
                blocks: HashMap::new(),
            },
        );
        self
    }

    pub fn with_players(mut self, online: u32, max: u32) -> Self {
        self.online_players = online;
        self.max_players = max;
        self
    }

    /// Makes `dispatch_command` return `false` for instructions whose
    /// first word is `name`.
    pub fn rejecting(mut self, name: &str) -> Self {
        self.rejected.insert(name.to_ascii_lowercase());
        self
    }

    pub fn probe(&self) -> WorldProbe {
        self.probe.clone()
    }

    /// The block at `pos`, or `None` for air and unknown worlds.
    pub fn block_at(&self, world: &str, pos: BlockPos) -> Option<Block> {
        self.dimensions.get(world)?.blocks.get(&pos).copied()
    }
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldHost for MemoryWorld {
    fn world_exists(&self, world: &str) -> bool {
        self.dimensions.contains_key(world)
    }

    fn spawn_point(&self, world: &str) -> Option<(i32, i32)> {
        self.dimensions.get(world).map(|d| d.spawn)
    }

    fn set_block(&mut self, world: &str, pos: BlockPos, block: Block) {
        let Some(dim) = self.dimensions.get_mut(world) else {
            tracing::warn!(world, %pos, "write to unknown world dropped");
            return;
        };
        match block {
            Block::Air => {
                dim.blocks.remove(&pos);
            }
            other => {
                dim.blocks.insert(pos, other);
            }
        }
        self.probe.inner.writes.fetch_add(1, Ordering::SeqCst);
        self.probe.record_writer();
    }

    fn dispatch_command(&mut self, command: &str) -> bool {
        self.probe.record_writer();
        if let Ok(mut log) = self.probe.inner.commands.lock() {
            log.push(command.to_string());
        }
        let name = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        !self.rejected.contains(&name)
    }

    fn announce(&mut self, message: &str) {
        tracing::info!(message, "announcement");
        if let Ok(mut log) = self.probe.inner.announcements.lock() {
            log.push(message.to_string());
        }
    }

    fn info(&self) -> HostInfo {
        HostInfo {
            name: "worldlink-memory".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            online_players: self.online_players,
            max_players: self.max_players,
        }
    }

    fn tick(&mut self, _tick: u64) {
        self.probe.inner.ticks.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_world_has_default_dimension() {
        let world = MemoryWorld::new();
        assert!(world.world_exists("world"));
        assert!(!world.world_exists("nether"));
        assert_eq!(world.spawn_point("world"), Some((0, 0)));
        assert_eq!(world.spawn_point("nether"), None);
    }

    #[test]
    fn test_set_block_records_write_and_thread() {
        let mut world = MemoryWorld::new();
        let probe = world.probe();
        let pos = BlockPos::new(1, 100, 1);

        world.set_block("world", pos, Block::Solid);
        assert_eq!(world.block_at("world", pos), Some(Block::Solid));
        world.set_block("world", pos, Block::Air);
        assert_eq!(world.block_at("world", pos), None);

        assert_eq!(probe.write_count(), 2);
        assert_eq!(probe.writer_threads().len(), 1);
    }

    #[test]
    fn test_write_to_unknown_world_is_dropped() {
        let mut world = MemoryWorld::new();
        let probe = world.probe();
        world.set_block("nether", BlockPos::new(0, 0, 0), Block::Glass);
        assert_eq!(probe.write_count(), 0);
    }

    #[test]
    fn test_dispatch_command_logs_and_honours_rejections() {
        let mut world = MemoryWorld::new().rejecting("fly");
        let probe = world.probe();

        assert!(world.dispatch_command("say hello"));
        assert!(!world.dispatch_command("FLY on"));
        assert_eq!(probe.commands(), vec!["say hello", "FLY on"]);
    }

    #[test]
    fn test_info_reports_players() {
        let world = MemoryWorld::new().with_players(3, 50);
        let info = world.info();
        assert_eq!(info.online_players, 3);
        assert_eq!(info.max_players, 50);
    }
}
