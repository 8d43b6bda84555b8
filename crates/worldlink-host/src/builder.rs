//! Structure builder: a square glass-walled room with a lit interior.
//!
//! The builder is pure. It validates a request and produces an ordered
//! [`StructurePlan`]; applying the plan is the host loop's job, spread
//! over as many ticks as the write budget needs.
//!
//! Layout, relative to the floor elevation `y0`:
//!
//! ```text
//! y0 + 4   ceiling   glass, full square
//! y0 + 3   walls     glass, perimeter only   + lights on an interior grid
//! y0 + 2   walls     glass, perimeter only
//! y0 + 1   walls     glass, perimeter only   ← reported center_y
//! y0       floor     solid, full square
//! ```

use std::sync::Arc;

use crate::{Block, BlockPos, HostError};

pub const MIN_SIZE: i64 = 3;
pub const MAX_SIZE: i64 = 100;

/// Height of the column emptied by a clearing pass, starting at `y0`.
pub const CLEAR_HEIGHT: i32 = 10;

const WALL_HEIGHT: i32 = 3;
const MIN_LIGHT_SPACING: i32 = 4;

/// A validated build request anchored at its minimum corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureSpec {
    pub origin_x: i32,
    pub origin_y: i32,
    pub origin_z: i32,
    pub size: u32,
    pub world: String,
}

/// Where the structure ended up; sent back to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureReport {
    pub center_x: i32,
    pub center_y: i32,
    pub center_z: i32,
    pub size: u32,
}

/// One pending block change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockWrite {
    pub world: Arc<str>,
    pub pos: BlockPos,
    pub block: Block,
}

/// The full ordered write list for one request.
#[derive(Debug, Clone)]
pub struct StructurePlan {
    pub report: StructureReport,
    pub writes: Vec<BlockWrite>,
}

/// Computes structure specs and write plans for a fixed floor elevation.
#[derive(Debug, Clone, Copy)]
pub struct StructureBuilder {
    floor_y: i32,
}

impl StructureBuilder {
    pub fn new(floor_y: i32) -> Self {
        Self { floor_y }
    }

    pub fn floor_y(&self) -> i32 {
        self.floor_y
    }

    /// Checks the size bound. Nothing else is inspected.
    pub fn validate_size(size: i64) -> Result<u32, HostError> {
        if !(MIN_SIZE..=MAX_SIZE).contains(&size) {
            return Err(HostError::InvalidSize(size));
        }
        Ok(size as u32)
    }

    /// A spec whose minimum corner is `(start_x, start_z)`.
    pub fn at_corner(
        &self,
        world: &str,
        start_x: i32,
        start_z: i32,
        size: i64,
    ) -> Result<StructureSpec, HostError> {
        let size = Self::validate_size(size)?;
        let (x, z) = (i64::from(start_x), i64::from(start_z));
        self.anchor(world, x, z, size, (x, z))
    }

    /// A spec centered on `(center_x, center_z)`.
    ///
    /// For even sizes the reported centroid is the cell just past the
    /// geometric middle, so it always equals the requested center.
    pub fn centered(
        &self,
        world: &str,
        center_x: i32,
        center_z: i32,
        size: i64,
    ) -> Result<StructureSpec, HostError> {
        let size = Self::validate_size(size)?;
        let half = i64::from(size / 2);
        let (x, z) = (i64::from(center_x), i64::from(center_z));
        self.anchor(world, x - half, z - half, size, (x, z))
    }

    /// Anchors a footprint at its minimum corner, checking that every
    /// block the plan may touch has an `i32` coordinate. `requested` is
    /// the point echoed back in the error.
    fn anchor(
        &self,
        world: &str,
        start_x: i64,
        start_z: i64,
        size: u32,
        requested: (i64, i64),
    ) -> Result<StructureSpec, HostError> {
        let far = i64::from(size) - 1;
        let fits = |v: i64| i32::try_from(v).is_ok();
        let top = i64::from(self.floor_y) + i64::from(CLEAR_HEIGHT);
        let in_range = fits(start_x) && fits(start_x + far) && fits(start_z) && fits(start_z + far);
        if !in_range || !fits(top) {
            return Err(HostError::OutOfBounds {
                x: requested.0,
                y: i64::from(self.floor_y),
                z: requested.1,
            });
        }
        Ok(StructureSpec {
            origin_x: start_x as i32,
            origin_y: self.floor_y,
            origin_z: start_z as i32,
            size,
            world: world.to_string(),
        })
    }

    pub fn report(&self, spec: &StructureSpec) -> StructureReport {
        let half = (spec.size / 2) as i32;
        StructureReport {
            center_x: spec.origin_x.saturating_add(half),
            center_y: spec.origin_y + 1,
            center_z: spec.origin_z.saturating_add(half),
            size: spec.size,
        }
    }

    /// Produces the ordered writes for `spec`.
    ///
    /// `spec` must come from [`at_corner`](Self::at_corner) or
    /// [`centered`](Self::centered), which keep every coordinate in range.
    /// With `clear`, the footprint is emptied to [`CLEAR_HEIGHT`] first.
    /// After that come floor, walls, ceiling and lights, in that order.
    pub fn plan(&self, spec: &StructureSpec, clear: bool) -> StructurePlan {
        let world: Arc<str> = Arc::from(spec.world.as_str());
        let (x0, y0, z0) = (spec.origin_x, spec.origin_y, spec.origin_z);
        let n = spec.size as i32;
        let (x1, z1) = (x0 + n - 1, z0 + n - 1);

        let mut writes = Vec::new();
        let mut put = |x: i32, y: i32, z: i32, block: Block| {
            writes.push(BlockWrite {
                world: Arc::clone(&world),
                pos: BlockPos::new(x, y, z),
                block,
            });
        };

        if clear {
            for y in y0..y0 + CLEAR_HEIGHT {
                for x in x0..=x1 {
                    for z in z0..=z1 {
                        put(x, y, z, Block::Air);
                    }
                }
            }
        }

        for x in x0..=x1 {
            for z in z0..=z1 {
                put(x, y0, z, Block::Solid);
            }
        }

        for y in y0 + 1..=y0 + WALL_HEIGHT {
            for x in x0..=x1 {
                put(x, y, z0, Block::Glass);
                put(x, y, z1, Block::Glass);
            }
            // Corners were placed by the x runs above.
            for z in z0 + 1..z1 {
                put(x0, y, z, Block::Glass);
                put(x1, y, z, Block::Glass);
            }
        }

        let ceiling = y0 + WALL_HEIGHT + 1;
        for x in x0..=x1 {
            for z in z0..=z1 {
                put(x, ceiling, z, Block::Glass);
            }
        }

        // Every `spacing`-th interior cell from the near wall. Offsets are
        // taken from the corner so nothing is computed past the far wall.
        let spacing = MIN_LIGHT_SPACING.max(n / 6);
        let grid = |lo: i32, hi: i32| (lo + 1..hi).filter(move |v| (v - lo) % spacing == 0);
        let light_y = y0 + WALL_HEIGHT;
        for x in grid(x0, x1) {
            for z in grid(z0, z1) {
                put(x, light_y, z, Block::Light);
            }
        }

        StructurePlan {
            report: self.report(spec),
            writes,
        }
    }
}
