/// Blocked depth buffer with a two-level hierarchical Z summary
///
/// Key Design Principles:
/// 1. Block layout: each 8×8 pixel block is stored contiguously (8 rows of 8 u16 = 128 bytes)
/// 2. Reversed depth: larger stored values are nearer; writes accumulate with `max`
/// 3. Conservative summary: level 1 stores the farthest (minimum) depth of each block,
///    level 2 the minimum of each 8×8 group of level-1 entries
/// 4. Queries descend level 2 → level 1 → pixels and stop as soon as the answer is known
use super::depth::DEPTH_CLEAR;

/// Block size in pixels along each axis (8×8 = 64 pixels per block)
pub const HIZ_BLOCK_SIZE: usize = 8;

/// Level-2 cells cover this many blocks along each axis
pub const HIZ_GROUP_SIZE: usize = 8;

/// One block of stored depth, indexed `[row][col]`.
pub type DepthBlock = [[u16; HIZ_BLOCK_SIZE]; HIZ_BLOCK_SIZE];

const CLEAR_BLOCK: DepthBlock = [[DEPTH_CLEAR; HIZ_BLOCK_SIZE]; HIZ_BLOCK_SIZE];

pub struct HiZBuffer {
    /// Width in 8×8 blocks
    blocks_x: usize,
    /// Height in 8×8 blocks
    blocks_y: usize,
    /// Width in level-2 cells
    groups_x: usize,
    /// Full resolution depth, block-major
    level0: Vec<DepthBlock>,
    /// Minimum depth of each block (blocks_x × blocks_y)
    level1: Vec<u16>,
    /// Minimum of each 8×8 group of level-1 entries
    level2: Vec<u16>,
}

impl HiZBuffer {
    /// Create a buffer covering at least `width × height` pixels
    pub fn new(width: usize, height: usize) -> Self {
        let blocks_x = (width + HIZ_BLOCK_SIZE - 1) / HIZ_BLOCK_SIZE;
        let blocks_y = (height + HIZ_BLOCK_SIZE - 1) / HIZ_BLOCK_SIZE;
        let groups_x = (blocks_x + HIZ_GROUP_SIZE - 1) / HIZ_GROUP_SIZE;
        let groups_y = (blocks_y + HIZ_GROUP_SIZE - 1) / HIZ_GROUP_SIZE;

        Self {
            blocks_x,
            blocks_y,
            groups_x,
            level0: vec![CLEAR_BLOCK; blocks_x * blocks_y],
            level1: vec![DEPTH_CLEAR; blocks_x * blocks_y],
            level2: vec![DEPTH_CLEAR; groups_x * groups_y],
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.level0.fill(CLEAR_BLOCK);
        self.level1.fill(DEPTH_CLEAR);
        self.level2.fill(DEPTH_CLEAR);
    }

    #[inline]
    pub fn blocks_x(&self) -> usize {
        self.blocks_x
    }

    #[inline]
    pub fn blocks_y(&self) -> usize {
        self.blocks_y
    }

    #[inline]
    pub fn block_index(&self, bx: usize, by: usize) -> usize {
        by * self.blocks_x + bx
    }

    #[inline]
    pub fn blocks(&self) -> &[DepthBlock] {
        &self.level0
    }

    #[inline]
    pub fn level1(&self) -> &[u16] {
        &self.level1
    }

    #[inline]
    pub fn level2(&self) -> &[u16] {
        &self.level2
    }

    /// Stored depth of a single pixel
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u16 {
        let block = &self.level0[self.block_index(x / HIZ_BLOCK_SIZE, y / HIZ_BLOCK_SIZE)];
        block[y % HIZ_BLOCK_SIZE][x % HIZ_BLOCK_SIZE]
    }

    /// Max-accumulate `depths` into the pixels of block `index` selected by
    /// `coverage` (bit `row * 8 + col`) and refresh both summary levels.
    ///
    /// Returns true if any stored value changed.
    pub fn write_block(&mut self, index: usize, coverage: u64, depths: &DepthBlock) -> bool {
        let block = &mut self.level0[index];
        let mut changed = false;
        let mut block_min = u16::MAX;

        for (row, (stored_row, new_row)) in block.iter_mut().zip(depths.iter()).enumerate() {
            let row_mask = (coverage >> (row * HIZ_BLOCK_SIZE)) as u8;
            for (col, (stored, &new)) in stored_row.iter_mut().zip(new_row.iter()).enumerate() {
                if row_mask & (1 << col) != 0 && new > *stored {
                    *stored = new;
                    changed = true;
                }
                block_min = block_min.min(*stored);
            }
        }

        if !changed {
            return false;
        }

        let old_min = self.level1[index];
        self.level1[index] = block_min;

        // Depth only grows between clears, so the group minimum can only move
        // when the block that held it grew.
        let group = self.group_of_block(index);
        if block_min != old_min && self.level2[group] == old_min {
            self.level2[group] = self.group_min(group);
        }

        true
    }

    #[inline]
    fn group_of_block(&self, index: usize) -> usize {
        let bx = index % self.blocks_x;
        let by = index / self.blocks_x;
        (by / HIZ_GROUP_SIZE) * self.groups_x + bx / HIZ_GROUP_SIZE
    }

    fn group_min(&self, group: usize) -> u16 {
        let gx = group % self.groups_x;
        let gy = group / self.groups_x;
        let bx0 = gx * HIZ_GROUP_SIZE;
        let by0 = gy * HIZ_GROUP_SIZE;
        let bx1 = (bx0 + HIZ_GROUP_SIZE).min(self.blocks_x);
        let by1 = (by0 + HIZ_GROUP_SIZE).min(self.blocks_y);

        let mut min = u16::MAX;
        for by in by0..by1 {
            let row = &self.level1[by * self.blocks_x + bx0..by * self.blocks_x + bx1];
            min = row.iter().copied().fold(min, u16::min);
        }
        min
    }

    /// Test whether anything at compressed depth `max_z` inside the inclusive
    /// pixel rectangle could be seen. The rectangle must already be clamped
    /// to the buffer.
    ///
    /// A pixel hides the query only when its stored depth is strictly nearer
    /// than `max_z`.
    pub fn is_visible(
        &self,
        min_x: usize,
        max_x: usize,
        min_y: usize,
        max_y: usize,
        max_z: u16,
    ) -> bool {
        let block_min_x = min_x / HIZ_BLOCK_SIZE;
        let block_max_x = (max_x / HIZ_BLOCK_SIZE).min(self.blocks_x - 1);
        let block_min_y = min_y / HIZ_BLOCK_SIZE;
        let block_max_y = (max_y / HIZ_BLOCK_SIZE).min(self.blocks_y - 1);

        // Quick test: coarsest level first
        let mut coarse_occluded = true;
        'groups: for gy in block_min_y / HIZ_GROUP_SIZE..=block_max_y / HIZ_GROUP_SIZE {
            for gx in block_min_x / HIZ_GROUP_SIZE..=block_max_x / HIZ_GROUP_SIZE {
                if max_z >= self.level2[gy * self.groups_x + gx] {
                    coarse_occluded = false;
                    break 'groups;
                }
            }
        }
        if coarse_occluded {
            return false;
        }

        for by in block_min_y..=block_max_y {
            for bx in block_min_x..=block_max_x {
                let index = self.block_index(bx, by);
                if max_z < self.level1[index] {
                    continue;
                }

                // Refine inside the part of the block covered by the rectangle
                let block = &self.level0[index];
                let x0 = min_x.max(bx * HIZ_BLOCK_SIZE) - bx * HIZ_BLOCK_SIZE;
                let x1 = max_x.min(bx * HIZ_BLOCK_SIZE + HIZ_BLOCK_SIZE - 1) - bx * HIZ_BLOCK_SIZE;
                let y0 = min_y.max(by * HIZ_BLOCK_SIZE) - by * HIZ_BLOCK_SIZE;
                let y1 = max_y.min(by * HIZ_BLOCK_SIZE + HIZ_BLOCK_SIZE - 1) - by * HIZ_BLOCK_SIZE;

                for row in &block[y0..=y1] {
                    if row[x0..=x1].iter().any(|&stored| stored <= max_z) {
                        return true;
                    }
                }
            }
        }

        false
    }
}
