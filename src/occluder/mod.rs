/// Baked occluder geometry
///
/// An `Occluder` is an immutable, quantized copy of a triangle soup laid out
/// for the rasterizer: triangles are grouped 4 at a time into packets, and
/// each packet stores the X lanes of its 4 triangles together, then Y, then Z,
/// so a packet decodes straight into `LaneGroup<4>` registers.
pub mod mesh;
pub mod quad_decomposition;
pub mod surface_area_heuristic;

pub use mesh::{BatchingConfig, MeshOccluder, MeshValidationError};

use crate::count_call;
use crate::geometry::Aabb;
use crate::perf::FUNCTION_COUNTERS;
use glam::{Mat4, Vec3};

/// Triangles per packet (the lane width of packet processing)
pub const PACKET_TRIANGLES: usize = 4;

/// Largest quantized coordinate; `ref_max` maps here
pub const QUANTIZATION_LEVELS: f32 = u16::MAX as f32;

/// One triangle corner for all 4 triangles of a packet, one lane per triangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct QuantizedCorner {
    pub x: [u16; PACKET_TRIANGLES],
    pub y: [u16; PACKET_TRIANGLES],
    pub z: [u16; PACKET_TRIANGLES],
}

/// Four triangles, stored corner-major then axis-major.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct TrianglePacket {
    pub corners: [QuantizedCorner; 3],
}

#[derive(Debug, Clone)]
pub struct Occluder {
    center: Vec3,
    ref_min: Vec3,
    ref_max: Vec3,
    bounds: Aabb,
    packets: Vec<TrianglePacket>,
    triangle_count: usize,
}

impl Occluder {
    /// Quantize a triangle soup against the reference box `[ref_min, ref_max]`.
    ///
    /// Vertices outside the reference box are clamped onto it. Padding
    /// triangles in the last packet have all three corners equal.
    ///
    /// # Panics
    /// If `vertices.len()` is not a multiple of three.
    pub fn bake(vertices: &[Vec3], ref_min: Vec3, ref_max: Vec3) -> Self {
        assert!(
            vertices.len() % 3 == 0,
            "occluder vertex count {} is not a whole number of triangles",
            vertices.len()
        );
        count_call!(FUNCTION_COUNTERS.occluders_baked);

        let extent = ref_max - ref_min;
        let scale = Vec3::select(
            extent.cmpgt(Vec3::ZERO),
            Vec3::splat(QUANTIZATION_LEVELS) / extent,
            Vec3::ZERO,
        );
        let quantize = |v: Vec3| {
            let q = ((v - ref_min) * scale)
                .round()
                .clamp(Vec3::ZERO, Vec3::splat(QUANTIZATION_LEVELS));
            [q.x as u16, q.y as u16, q.z as u16]
        };

        let triangle_count = vertices.len() / 3;
        let packets = vertices
            .chunks(3 * PACKET_TRIANGLES)
            .map(|chunk| {
                let mut packet = TrianglePacket::default();
                for (lane, triangle) in chunk.chunks_exact(3).enumerate() {
                    for (corner, &v) in packet.corners.iter_mut().zip(triangle) {
                        let [x, y, z] = quantize(v);
                        corner.x[lane] = x;
                        corner.y[lane] = y;
                        corner.z[lane] = z;
                    }
                }
                packet
            })
            .collect::<Vec<_>>();

        log::trace!(
            "baked {} triangles into {} packets",
            triangle_count,
            packets.len()
        );

        Self {
            center: (ref_min + ref_max) * 0.5,
            ref_min,
            ref_max,
            bounds: Aabb::from_points(vertices),
            packets,
            triangle_count,
        }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        self.center
    }

    #[inline]
    pub fn ref_min(&self) -> Vec3 {
        self.ref_min
    }

    #[inline]
    pub fn ref_max(&self) -> Vec3 {
        self.ref_max
    }

    /// Tight bounds of the unpadded input vertices
    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    #[inline]
    pub fn bounds_min(&self) -> Vec3 {
        self.bounds.min
    }

    #[inline]
    pub fn bounds_max(&self) -> Vec3 {
        self.bounds.max
    }

    #[inline]
    pub fn packets(&self) -> &[TrianglePacket] {
        &self.packets
    }

    #[inline]
    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    /// Number of real (unpadded) triangles
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    /// Size of one quantization step along each axis (zero for flat axes)
    #[inline]
    pub fn quantization_step(&self) -> Vec3 {
        (self.ref_max - self.ref_min).max(Vec3::ZERO) / QUANTIZATION_LEVELS
    }

    /// Maps quantized coordinates (as floats) back to local space.
    pub fn dequantization_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.ref_min) * Mat4::from_scale(self.quantization_step())
    }

    #[inline]
    pub fn dequantize(&self, q: [u16; 3]) -> Vec3 {
        self.ref_min + Vec3::new(q[0] as f32, q[1] as f32, q[2] as f32) * self.quantization_step()
    }

    /// Decoded triangles, padding excluded
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.packets
            .iter()
            .flat_map(|packet| {
                (0..PACKET_TRIANGLES).map(move |lane| {
                    packet
                        .corners
                        .map(|c| [c.x[lane], c.y[lane], c.z[lane]])
                })
            })
            .take(self.triangle_count)
            .map(|corners| corners.map(|q| self.dequantize(q)))
    }
}
