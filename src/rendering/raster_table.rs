//! Precomputed half-plane coverage masks for 8×8 blocks.
//!
//! An edge is described by its unit normal `(nx, ny)` (pointing into the
//! triangle) and its signed distance `offset` from the block centre, in
//! pixels. The normal components are quantized to `1 / NORMAL_STEPS` and the
//! offset to `1 / OFFSET_STEPS` pixel; the table maps each quantized edge to a
//! 64-bit mask (bit `row * 8 + col`) of the pixel centres on the inner side.
//!
//! Quantization uses round-half-away-from-zero, so an edge and its reverse
//! map to exactly negated keys, and the masks of negated keys are exact
//! complements (ties on the line are broken by the sign of the normal). Two
//! triangles sharing an edge therefore never leave holes between them.
use super::hiz_buffer::HIZ_BLOCK_SIZE;

const NORMAL_STEPS: i32 = 32;
const OFFSET_STEPS: i32 = 8;

/// Edges at least this far from the block centre cover all or none of it.
/// Larger than the centre-to-corner-pixel distance (3.5 * sqrt(2)).
pub const TRIVIAL_OFFSET: f32 = 5.0;

const MAX_OFFSET_KEY: i32 = (TRIVIAL_OFFSET as i32) * OFFSET_STEPS;
const OFFSET_SLOTS: usize = (2 * MAX_OFFSET_KEY + 1) as usize;
const NORMAL_SIDE: usize = (2 * NORMAL_STEPS + 1) as usize;

pub const FULL_MASK: u64 = u64::MAX;

pub struct RasterTable {
    /// Compact slot per quantized normal, -1 where no unit normal rounds to it.
    normal_slots: Vec<i16>,
    masks: Vec<u64>,
}

impl RasterTable {
    pub fn new() -> Self {
        let mut normal_slots = vec![-1i16; NORMAL_SIDE * NORMAL_SIDE];
        let mut masks = Vec::new();
        let mut slot_count = 0i16;

        for qy in -NORMAL_STEPS..=NORMAL_STEPS {
            for qx in -NORMAL_STEPS..=NORMAL_STEPS {
                // A rounded unit normal is within sqrt(2)/2 of the circle.
                let len = ((qx * qx + qy * qy) as f32).sqrt();
                if (len - NORMAL_STEPS as f32).abs() > 1.0 {
                    continue;
                }

                normal_slots[Self::normal_key(qx, qy)] = slot_count;
                slot_count += 1;

                for qo in -MAX_OFFSET_KEY..=MAX_OFFSET_KEY {
                    masks.push(quantized_edge_mask(qx, qy, qo));
                }
            }
        }

        log::debug!(
            "built raster table: {} normal slots, {} masks ({} KiB)",
            slot_count,
            masks.len(),
            masks.len() * std::mem::size_of::<u64>() / 1024
        );

        Self {
            normal_slots,
            masks,
        }
    }

    #[inline(always)]
    fn normal_key(qx: i32, qy: i32) -> usize {
        (qy + NORMAL_STEPS) as usize * NORMAL_SIDE + (qx + NORMAL_STEPS) as usize
    }

    /// Coverage of the half-plane `nx * px + ny * py + offset >= 0` over the
    /// pixel centres `p` of a block, relative to the block centre.
    #[inline(always)]
    pub fn edge_mask(&self, nx: f32, ny: f32, offset: f32) -> u64 {
        if offset >= TRIVIAL_OFFSET {
            return FULL_MASK;
        }
        if !(offset > -TRIVIAL_OFFSET) {
            return 0;
        }

        let qx = (nx * NORMAL_STEPS as f32).round() as i32;
        let qy = (ny * NORMAL_STEPS as f32).round() as i32;
        let qo = (offset * OFFSET_STEPS as f32).round() as i32;

        if qx.abs() > NORMAL_STEPS || qy.abs() > NORMAL_STEPS {
            return quantized_edge_mask(qx, qy, qo);
        }

        let slot = self.normal_slots[Self::normal_key(qx, qy)];
        if slot < 0 {
            // Not reachable from a unit normal; evaluate directly.
            return quantized_edge_mask(qx, qy, qo);
        }

        self.masks[slot as usize * OFFSET_SLOTS + (qo + MAX_OFFSET_KEY) as usize]
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

impl Default for RasterTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact integer evaluation of a quantized edge against the 64 pixel centres.
///
/// Pixel centres sit at odd half-integers `(2 * col - 7) / 2` from the block
/// centre, so scaling the line by `2 * NORMAL_STEPS * OFFSET_STEPS` keeps
/// everything integral.
pub fn quantized_edge_mask(qx: i32, qy: i32, qo: i32) -> u64 {
    let wins_ties = qx > 0 || (qx == 0 && qy > 0);
    let mut mask = 0u64;

    for row in 0..HIZ_BLOCK_SIZE as i32 {
        let py2 = 2 * row - 7;
        for col in 0..HIZ_BLOCK_SIZE as i32 {
            let px2 = 2 * col - 7;
            let f = (qx * px2 + qy * py2) * OFFSET_STEPS + 2 * NORMAL_STEPS * qo;
            if f > 0 || (f == 0 && wins_ties) {
                mask |= 1u64 << (row * HIZ_BLOCK_SIZE as i32 + col);
            }
        }
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(angle: f32) -> (f32, f32) {
        (angle.cos(), angle.sin())
    }

    #[test]
    fn horizontal_edge_splits_rows() {
        let table = RasterTable::new();
        // Normal pointing down the screen: rows 4..8 are inside.
        assert_eq!(table.edge_mask(0.0, 1.0, 0.0), 0xFFFF_FFFF_0000_0000);
        assert_eq!(table.edge_mask(0.0, -1.0, 0.0), 0x0000_0000_FFFF_FFFF);
    }

    #[test]
    fn vertical_edge_splits_columns() {
        let table = RasterTable::new();
        let right_half = table.edge_mask(1.0, 0.0, 0.0);
        for row in 0..8 {
            assert_eq!((right_half >> (row * 8)) & 0xFF, 0xF0);
        }
        // Shifting the edge one pixel to the left adds one column.
        let wider = table.edge_mask(1.0, 0.0, 1.0);
        for row in 0..8 {
            assert_eq!((wider >> (row * 8)) & 0xFF, 0xF8);
        }
    }

    #[test]
    fn far_edges_are_trivial() {
        let table = RasterTable::new();
        assert_eq!(table.edge_mask(0.6, 0.8, 5.0), FULL_MASK);
        assert_eq!(table.edge_mask(0.6, 0.8, 100.0), FULL_MASK);
        assert_eq!(table.edge_mask(0.6, 0.8, -5.0), 0);
        assert_eq!(table.edge_mask(0.6, 0.8, f32::NAN), 0);
    }

    #[test]
    fn reversed_edges_are_exact_complements() {
        let table = RasterTable::new();
        for step in 0..360 {
            let (nx, ny) = unit((step as f32).to_radians());
            for k in -45..=45 {
                let offset = k as f32 * 0.113;
                let forward = table.edge_mask(nx, ny, offset);
                let backward = table.edge_mask(-nx, -ny, -offset);
                assert_eq!(
                    forward ^ backward,
                    FULL_MASK,
                    "angle {} offset {} is not complementary",
                    step,
                    offset
                );
            }
        }
    }

    #[test]
    fn every_slot_matches_direct_evaluation() {
        let table = RasterTable::new();
        assert!(!table.is_empty());
        for step in 0..720 {
            let (nx, ny) = unit((step as f32 * 0.5).to_radians());
            let qx = (nx * NORMAL_STEPS as f32).round() as i32;
            let qy = (ny * NORMAL_STEPS as f32).round() as i32;
            // The outermost keys are answered by the trivial all/none test.
            for qo in (1 - MAX_OFFSET_KEY)..MAX_OFFSET_KEY {
                let offset = qo as f32 / OFFSET_STEPS as f32;
                assert_eq!(
                    table.edge_mask(nx, ny, offset),
                    quantized_edge_mask(qx, qy, qo)
                );
            }
        }
    }

    #[test]
    fn coverage_tracks_the_true_edge() {
        // Pixels more than a fifth of a pixel from the edge are classified
        // exactly like the unquantized half-plane.
        let table = RasterTable::new();
        for step in 0..90 {
            let (nx, ny) = unit((step as f32 * 4.0).to_radians());
            for k in -20..=20 {
                let offset = k as f32 * 0.21;
                let mask = table.edge_mask(nx, ny, offset);
                for row in 0..8 {
                    for col in 0..8 {
                        let px = col as f32 - 3.5;
                        let py = row as f32 - 3.5;
                        let f = nx * px + ny * py + offset;
                        if f.abs() < 0.2 {
                            continue;
                        }
                        let bit = mask & (1u64 << (row * 8 + col)) != 0;
                        assert_eq!(bit, f > 0.0, "pixel ({}, {}) misclassified", col, row);
                    }
                }
            }
        }
    }
}
