/// Binned occlusion rasterizer
///
/// Occluder packets are transformed 4 triangles at a time, projected with
/// the viewport and reversed depth already folded into the working matrix,
/// and rasterized block by block: coverage of each 8×8 block is the AND of
/// three precomputed edge masks, depth comes from the triangle's screen-space
/// plane, and the block is max-accumulated into the Hi-Z buffer.
use super::depth::{compress, decompress_float, DEPTH_CLEAR};
use super::hiz_buffer::{DepthBlock, HiZBuffer, HIZ_BLOCK_SIZE};
use super::lanes::{F32x4, F32x8, LaneVec4};
use super::raster_table::{RasterTable, FULL_MASK};
use crate::geometry::Aabb;
use crate::occluder::{Occluder, PACKET_TRIANGLES};
use crate::perf::FUNCTION_COUNTERS;
use crate::{count_add, count_call};
use glam::{Mat4, Vec2, Vec3, Vec4};
use std::cell::OnceCell;

/// Twice the screen area (in pixels²) below which a triangle is dropped
const MIN_AREA2: f32 = 1e-7;

/// What a query reports for a box lying entirely behind the near plane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NearPlanePolicy {
    /// Behind the camera means not visible
    #[default]
    Reject,
    /// Report visible and ask the caller to test it another way
    AssumeVisible,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxVisibility {
    pub visible: bool,
    /// The box crosses (or lies behind) the near plane, so the answer is a
    /// conservative guess and geometry inside it needs the clipping path
    pub needs_clipping: bool,
}

pub struct Rasterizer {
    width: usize,
    height: usize,
    model_view_projection: Mat4,
    /// Viewport, Y flip and reversed depth applied after the raw matrix
    working: Mat4,
    matrix_set: bool,
    near_plane_policy: NearPlanePolicy,
    raster_table: OnceCell<RasterTable>,
    hiz: HiZBuffer,
}

impl Rasterizer {
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "rasterizer resolution must be non-zero");

        log::debug!(
            "occlusion rasterizer {}x{} ({}x{} blocks)",
            width,
            height,
            (width + HIZ_BLOCK_SIZE - 1) / HIZ_BLOCK_SIZE,
            (height + HIZ_BLOCK_SIZE - 1) / HIZ_BLOCK_SIZE
        );

        Self {
            width,
            height,
            model_view_projection: Mat4::IDENTITY,
            working: Mat4::IDENTITY,
            matrix_set: false,
            near_plane_policy: NearPlanePolicy::default(),
            raster_table: OnceCell::new(),
            hiz: HiZBuffer::new(width, height),
        }
    }

    /// Store the clip-space transform (glam conventions: right-handed, depth
    /// in [0, 1]). No validation is done; a singular matrix rasterizes garbage.
    pub fn set_model_view_projection(&mut self, matrix: &Mat4) {
        let half_w = self.width as f32 * 0.5;
        let half_h = self.height as f32 * 0.5;
        // x' = (x + w) * W/2, y' = (w - y) * H/2, z' = w - z
        let viewport = Mat4::from_cols(
            Vec4::new(half_w, 0.0, 0.0, 0.0),
            Vec4::new(0.0, -half_h, 0.0, 0.0),
            Vec4::new(0.0, 0.0, -1.0, 0.0),
            Vec4::new(half_w, half_h, 1.0, 1.0),
        );

        self.model_view_projection = *matrix;
        self.working = viewport * *matrix;
        self.matrix_set = true;
    }

    #[inline]
    pub fn model_view_projection(&self) -> &Mat4 {
        &self.model_view_projection
    }

    /// Reset depth and Hi-Z to "nothing drawn". Never called implicitly.
    pub fn clear(&mut self) {
        count_call!(FUNCTION_COUNTERS.depth_clear_calls);
        self.hiz.clear();
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn blocks_x(&self) -> usize {
        self.hiz.blocks_x()
    }

    #[inline]
    pub fn blocks_y(&self) -> usize {
        self.hiz.blocks_y()
    }

    /// Full-resolution depth, one 8×8 block per entry, row-major blocks
    #[inline]
    pub fn depth_buffer(&self) -> &[DepthBlock] {
        self.hiz.blocks()
    }

    /// Per-block minimum stored depth
    #[inline]
    pub fn hi_z(&self) -> &[u16] {
        self.hiz.level1()
    }

    #[inline]
    pub fn hiz_buffer(&self) -> &HiZBuffer {
        &self.hiz
    }

    #[inline]
    pub fn near_plane_policy(&self) -> NearPlanePolicy {
        self.near_plane_policy
    }

    #[inline]
    pub fn set_near_plane_policy(&mut self, policy: NearPlanePolicy) {
        self.near_plane_policy = policy;
    }

    /// Accumulate an occluder into the depth buffer.
    ///
    /// With `POSSIBLY_NEAR_CLIPPED = false` every vertex must lie in front of
    /// the near plane; use `true` for occluders whose bounds cross it.
    pub fn rasterize<const POSSIBLY_NEAR_CLIPPED: bool>(&mut self, occluder: &Occluder) {
        debug_assert!(self.matrix_set, "set_model_view_projection must be called before rasterize");
        count_call!(FUNCTION_COUNTERS.rasterize_calls);

        let table = self.raster_table.get_or_init(RasterTable::new);
        let hiz = &mut self.hiz;
        let m = self.working * occluder.dequantization_matrix();
        let mut remaining = occluder.triangle_count();

        for packet in occluder.packets() {
            count_call!(FUNCTION_COUNTERS.packets_processed);
            let live = remaining.min(PACKET_TRIANGLES);
            remaining -= live;
            count_add!(FUNCTION_COUNTERS.triangles_processed, live);

            let corners = packet.corners.map(|c| {
                LaneVec4::<PACKET_TRIANGLES>::transform_points(
                    &m,
                    F32x4::from_fn(|i| c.x[i] as f32),
                    F32x4::from_fn(|i| c.y[i] as f32),
                    F32x4::from_fn(|i| c.z[i] as f32),
                )
            });

            if POSSIBLY_NEAR_CLIPPED {
                for lane in 0..live {
                    let tri = corners.map(|c| c.lane(lane));
                    rasterize_clipped(table, hiz, tri);
                }
            } else {
                rasterize_packet(table, hiz, &corners, live);
            }
        }
    }

    /// Conservative visibility of a world-space box against the depth
    /// accumulated so far.
    pub fn query_visibility(&self, bounds_min: Vec3, bounds_max: Vec3) -> BoxVisibility {
        debug_assert!(self.matrix_set, "set_model_view_projection must be called before query_visibility");
        count_call!(FUNCTION_COUNTERS.visibility_queries);

        let corners = Aabb::new(bounds_min, bounds_max).corners();
        let p = LaneVec4::<8>::transform_points(
            &self.working,
            F32x8::from_fn(|i| corners[i].x),
            F32x8::from_fn(|i| corners[i].y),
            F32x8::from_fn(|i| corners[i].z),
        );

        // Distance in front of the near plane (clip z)
        let behind = (p.w - p.z).lt_mask(F32x8::ZERO);
        if behind == F32x8::full_mask() {
            return match self.near_plane_policy {
                NearPlanePolicy::Reject => {
                    count_call!(FUNCTION_COUNTERS.visibility_queries_culled);
                    BoxVisibility::default()
                }
                NearPlanePolicy::AssumeVisible => BoxVisibility {
                    visible: true,
                    needs_clipping: true,
                },
            };
        }
        if behind != 0 {
            return BoxVisibility {
                visible: true,
                needs_clipping: true,
            };
        }

        let inv_w = F32x8::splat(1.0) / p.w;
        let sx = p.x * inv_w;
        let sy = p.y * inv_w;
        let sz = p.z * inv_w;

        let nearest = sz.reduce_max();
        let (min_x, max_x) = (sx.reduce_min(), sx.reduce_max());
        let (min_y, max_y) = (sy.reduce_min(), sy.reduce_max());
        let (w, h) = (self.width as f32, self.height as f32);

        let on_screen = nearest > 0.0 && max_x >= 0.0 && max_y >= 0.0 && min_x < w && min_y < h;
        let visible = on_screen
            && self.query_2d(
                min_x.max(0.0) as usize,
                max_x.min(w - 1.0) as usize,
                min_y.max(0.0) as usize,
                max_y.min(h - 1.0) as usize,
                compress(nearest),
            );

        if !visible {
            count_call!(FUNCTION_COUNTERS.visibility_queries_culled);
        }
        BoxVisibility {
            visible,
            needs_clipping: false,
        }
    }

    /// Screen-space visibility of the inclusive pixel rectangle at
    /// compressed depth `max_z` (its nearest point). The rectangle is
    /// clamped to the viewport.
    pub fn query_2d(&self, min_x: usize, max_x: usize, min_y: usize, max_y: usize, max_z: u16) -> bool {
        if min_x >= self.width || min_y >= self.height || min_x > max_x || min_y > max_y {
            return false;
        }
        let max_x = max_x.min(self.width - 1);
        let max_y = max_y.min(self.height - 1);
        self.hiz.is_visible(min_x, max_x, min_y, max_y, max_z)
    }

    /// Decompress the viewport into `target` (row-major, `width * height`
    /// normalized depths, 0 where nothing was drawn).
    pub fn read_back_depth(&self, target: &mut [f32]) {
        assert_eq!(
            target.len(),
            self.width * self.height,
            "depth read-back target has the wrong size"
        );
        for (y, row) in target.chunks_exact_mut(self.width).enumerate() {
            for (x, out) in row.iter_mut().enumerate() {
                *out = decompress_float(self.hiz.pixel(x, y));
            }
        }
    }
}

/// Twice the signed screen area; positive for clockwise-on-screen triangles
#[inline(always)]
fn area2(v: &[Vec3; 3]) -> f32 {
    (v[1].x - v[0].x) * (v[2].y - v[0].y) - (v[2].x - v[0].x) * (v[1].y - v[0].y)
}

#[inline(always)]
fn project(p: Vec4) -> Vec3 {
    let inv_w = 1.0 / p.w;
    Vec3::new(p.x * inv_w, p.y * inv_w, p.z * inv_w)
}

/// Project all lanes of a packet at once and draw the usable triangles.
fn rasterize_packet(table: &RasterTable, hiz: &mut HiZBuffer, corners: &[LaneVec4<4>; 3], live: usize) {
    let screen = corners.map(|c| {
        let inv_w = F32x4::splat(1.0) / c.w;
        [c.x * inv_w, c.y * inv_w, c.z * inv_w]
    });
    let [s0, s1, s2] = &screen;

    // Padding lanes of the last packet get zero area
    let live_mask = F32x4::full_mask() >> (PACKET_TRIANGLES - live);
    let area = (s1[0] - s0[0]) * (s2[1] - s0[1]) - (s2[0] - s0[0]) * (s1[1] - s0[1]);
    let area = F32x4::select(live_mask, area, F32x4::ZERO);
    let usable = F32x4::splat(MIN_AREA2).lt_mask(area.abs())
        & area.is_finite_mask()
        & (s0[2] + s1[2] + s2[2]).is_finite_mask();

    count_add!(FUNCTION_COUNTERS.triangles_culled, live - usable.count_ones() as usize);

    for lane in (0..PACKET_TRIANGLES).filter(|lane| usable & (1 << lane) != 0) {
        let v = screen.map(|s| Vec3::new(s[0][lane], s[1][lane], s[2][lane]));
        draw_triangle(table, hiz, &v, area[lane]);
    }
}

/// Clip one triangle against the near plane and draw what is left.
fn rasterize_clipped(table: &RasterTable, hiz: &mut HiZBuffer, tri: [Vec4; 3]) {
    // Clip z in the working space
    let dist = tri.map(|p| p.w - p.z);

    if dist.iter().all(|&d| d >= 0.0) {
        let v = tri.map(project);
        draw_if_usable(table, hiz, &v);
        return;
    }

    count_call!(FUNCTION_COUNTERS.triangles_clipped);
    let (count, clipped) = clip_triangle_near(tri, dist);
    if count == 0 {
        count_call!(FUNCTION_COUNTERS.triangles_culled);
        return;
    }
    for t in clipped.iter().take(count) {
        let v = t.map(project);
        draw_if_usable(table, hiz, &v);
    }
}

#[inline]
fn draw_if_usable(table: &RasterTable, hiz: &mut HiZBuffer, v: &[Vec3; 3]) {
    let area = area2(v);
    if !(area.abs() > MIN_AREA2) || !area.is_finite() || !(v[0].z + v[1].z + v[2].z).is_finite() {
        count_call!(FUNCTION_COUNTERS.triangles_culled);
        return;
    }
    draw_triangle(table, hiz, v, area);
}

/// Point on edge `inside -> outside` where the clip distance reaches zero.
/// Always computed from the inside end, so a shared edge clips to the same
/// point in both triangles.
#[inline]
fn intersect_near(inside: Vec4, d_in: f32, outside: Vec4, d_out: f32) -> Vec4 {
    let t = d_in / (d_in - d_out);
    inside + (outside - inside) * t
}

/// Sutherland-Hodgman against `dist >= 0`. Returns 0, 1 or 2 triangles.
fn clip_triangle_near(tri: [Vec4; 3], dist: [f32; 3]) -> (usize, [[Vec4; 3]; 2]) {
    let mut polygon = [tri[0]; 4];
    let mut len = 0usize;

    let mut prev = 2;
    for curr in 0..3 {
        let prev_inside = dist[prev] >= 0.0;
        let curr_inside = dist[curr] >= 0.0;

        match (prev_inside, curr_inside) {
            (true, true) => {
                polygon[len] = tri[curr];
                len += 1;
            }
            (true, false) => {
                polygon[len] = intersect_near(tri[prev], dist[prev], tri[curr], dist[curr]);
                len += 1;
            }
            (false, true) => {
                polygon[len] = intersect_near(tri[curr], dist[curr], tri[prev], dist[prev]);
                len += 1;
                polygon[len] = tri[curr];
                len += 1;
            }
            (false, false) => {}
        }
        prev = curr;
    }

    let mut tris = [[tri[0]; 3]; 2];
    match len {
        3 => {
            tris[0] = [polygon[0], polygon[1], polygon[2]];
            (1, tris)
        }
        4 => {
            tris[0] = [polygon[0], polygon[1], polygon[2]];
            tris[1] = [polygon[0], polygon[2], polygon[3]];
            (2, tris)
        }
        _ => (0, tris),
    }
}

/// Rasterize one screen-space triangle (x, y in pixels, z normalized depth).
fn draw_triangle(table: &RasterTable, hiz: &mut HiZBuffer, v: &[Vec3; 3], area2: f32) {
    let min_x = v[0].x.min(v[1].x).min(v[2].x);
    let max_x = v[0].x.max(v[1].x).max(v[2].x);
    let min_y = v[0].y.min(v[1].y).min(v[2].y);
    let max_y = v[0].y.max(v[1].y).max(v[2].y);

    let block = HIZ_BLOCK_SIZE as f32;
    let extent_x = (hiz.blocks_x() * HIZ_BLOCK_SIZE) as f32;
    let extent_y = (hiz.blocks_y() * HIZ_BLOCK_SIZE) as f32;
    if max_x < 0.0 || max_y < 0.0 || min_x >= extent_x || min_y >= extent_y {
        count_call!(FUNCTION_COUNTERS.triangles_culled);
        return;
    }

    let z_min = v[0].z.min(v[1].z).min(v[2].z);
    let z_max = v[0].z.max(v[1].z).max(v[2].z);
    let nearest = compress(z_max);
    if nearest == DEPTH_CLEAR {
        // Entirely beyond the far plane
        count_call!(FUNCTION_COUNTERS.triangles_culled);
        return;
    }

    let bx0 = (min_x / block).max(0.0) as usize;
    let by0 = (min_y / block).max(0.0) as usize;
    let bx1 = (max_x / block).min((hiz.blocks_x() - 1) as f32) as usize;
    let by1 = (max_y / block).min((hiz.blocks_y() - 1) as f32) as usize;

    // Inward unit normal and constant of each edge, n · p + c >= 0 inside
    let sign = area2.signum();
    let edges: [(Vec2, f32); 3] = std::array::from_fn(|i| {
        let p = v[i].truncate();
        let q = v[(i + 1) % 3].truncate();
        let n = Vec2::new(p.y - q.y, q.x - p.x) * sign;
        let n = n / n.length();
        let mid = (p + q) * 0.5;
        (n, -n.dot(mid))
    });

    // Screen-space depth plane
    let (d1, d2) = (v[1] - v[0], v[2] - v[0]);
    let dzdx = (d1.z * d2.y - d2.z * d1.y) / area2;
    let dzdy = (d1.x * d2.z - d2.x * d1.z) / area2;

    for by in by0..=by1 {
        let cy = (by * HIZ_BLOCK_SIZE) as f32 + block * 0.5;
        for bx in bx0..=bx1 {
            count_call!(FUNCTION_COUNTERS.blocks_tested);
            let index = hiz.block_index(bx, by);
            if nearest <= hiz.level1()[index] {
                count_call!(FUNCTION_COUNTERS.blocks_rejected_hiz);
                continue;
            }

            let cx = (bx * HIZ_BLOCK_SIZE) as f32 + block * 0.5;
            let mut coverage = FULL_MASK;
            for (n, c) in &edges {
                let offset = n.x * cx + n.y * cy + c;
                coverage &= table.edge_mask(n.x, n.y, offset);
                if coverage == 0 {
                    break;
                }
            }
            if coverage == 0 {
                continue;
            }

            let x0 = (bx * HIZ_BLOCK_SIZE) as f32 + 0.5;
            let y0 = (by * HIZ_BLOCK_SIZE) as f32 + 0.5;
            let mut row_z = v[0].z + dzdx * (x0 - v[0].x) + dzdy * (y0 - v[0].y);
            let mut depths: DepthBlock = [[DEPTH_CLEAR; HIZ_BLOCK_SIZE]; HIZ_BLOCK_SIZE];
            for (row, out) in depths.iter_mut().enumerate() {
                if (coverage >> (row * HIZ_BLOCK_SIZE)) & 0xFF != 0 {
                    let z = F32x8::ramp(row_z, dzdx).clamp(z_min, z_max);
                    *out = z.0.map(compress);
                }
                row_z += dzdy;
            }

            if hiz.write_block(index, coverage, &depths) {
                count_call!(FUNCTION_COUNTERS.blocks_written);
            }
        }
    }
}
