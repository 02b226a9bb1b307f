//! Fixed-width lane groups used for all packet processing.
//!
//! A `LaneGroup<N>` is an `[f32; N]` with elementwise arithmetic. Packet code
//! (4 triangles per packet, 8 box corners per query, 8 pixels per block row)
//! is written against this type only, so the loops stay simple enough for the
//! compiler to lower them to SSE/AVX registers.
use glam::{Mat4, Vec4};
use std::ops::{Add, Div, Index, IndexMut, Mul, Neg, Sub};

#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(C, align(32))]
pub struct LaneGroup<const N: usize>(pub [f32; N]);

/// One lane per triangle of a packet.
pub type F32x4 = LaneGroup<4>;
/// One lane per box corner or per pixel of a block row.
pub type F32x8 = LaneGroup<8>;

impl<const N: usize> LaneGroup<N> {
    pub const ZERO: Self = Self([0.0; N]);

    #[inline(always)]
    pub fn splat(v: f32) -> Self {
        Self([v; N])
    }

    #[inline(always)]
    pub fn from_fn(f: impl FnMut(usize) -> f32) -> Self {
        Self(std::array::from_fn(f))
    }

    /// `0, step, 2 * step, ...` offset by `start`.
    #[inline(always)]
    pub fn ramp(start: f32, step: f32) -> Self {
        Self::from_fn(|i| start + step * i as f32)
    }

    #[inline(always)]
    pub fn min(self, rhs: Self) -> Self {
        Self::from_fn(|i| self.0[i].min(rhs.0[i]))
    }

    #[inline(always)]
    pub fn max(self, rhs: Self) -> Self {
        Self::from_fn(|i| self.0[i].max(rhs.0[i]))
    }

    /// `self * a + b`
    #[inline(always)]
    pub fn mul_add(self, a: Self, b: Self) -> Self {
        Self::from_fn(|i| self.0[i] * a.0[i] + b.0[i])
    }

    #[inline(always)]
    pub fn abs(self) -> Self {
        Self::from_fn(|i| self.0[i].abs())
    }

    #[inline(always)]
    pub fn clamp(self, lo: f32, hi: f32) -> Self {
        Self::from_fn(|i| self.0[i].clamp(lo, hi))
    }

    #[inline(always)]
    pub fn reduce_min(self) -> f32 {
        self.0.iter().copied().fold(f32::INFINITY, f32::min)
    }

    #[inline(always)]
    pub fn reduce_max(self) -> f32 {
        self.0.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Bit `i` set where `self[i] < rhs[i]`.
    #[inline(always)]
    pub fn lt_mask(self, rhs: Self) -> u32 {
        let mut mask = 0u32;
        for i in 0..N {
            if self.0[i] < rhs.0[i] {
                mask |= 1 << i;
            }
        }
        mask
    }

    /// Lane-wise `if mask bit { a } else { b }`.
    #[inline(always)]
    pub fn select(mask: u32, a: Self, b: Self) -> Self {
        Self::from_fn(|i| if mask & (1 << i) != 0 { a.0[i] } else { b.0[i] })
    }

    /// Bit mask of all lanes.
    #[inline(always)]
    pub const fn full_mask() -> u32 {
        if N >= 32 {
            u32::MAX
        } else {
            (1u32 << N) - 1
        }
    }

    #[inline(always)]
    pub fn is_finite_mask(self) -> u32 {
        let mut mask = 0u32;
        for i in 0..N {
            if self.0[i].is_finite() {
                mask |= 1 << i;
            }
        }
        mask
    }
}

macro_rules! lane_binop {
    ($trait:ident, $fn:ident, $op:tt) => {
        impl<const N: usize> $trait for LaneGroup<N> {
            type Output = Self;

            #[inline(always)]
            fn $fn(self, rhs: Self) -> Self {
                Self::from_fn(|i| self.0[i] $op rhs.0[i])
            }
        }

        impl<const N: usize> $trait<f32> for LaneGroup<N> {
            type Output = Self;

            #[inline(always)]
            fn $fn(self, rhs: f32) -> Self {
                Self::from_fn(|i| self.0[i] $op rhs)
            }
        }
    };
}

lane_binop!(Add, add, +);
lane_binop!(Sub, sub, -);
lane_binop!(Mul, mul, *);
lane_binop!(Div, div, /);

impl<const N: usize> Neg for LaneGroup<N> {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self {
        Self::from_fn(|i| -self.0[i])
    }
}

impl<const N: usize> Index<usize> for LaneGroup<N> {
    type Output = f32;

    #[inline(always)]
    fn index(&self, index: usize) -> &f32 {
        &self.0[index]
    }
}

impl<const N: usize> IndexMut<usize> for LaneGroup<N> {
    #[inline(always)]
    fn index_mut(&mut self, index: usize) -> &mut f32 {
        &mut self.0[index]
    }
}

/// Homogeneous positions in structure-of-arrays form, one point per lane.
#[derive(Copy, Clone, Debug)]
pub struct LaneVec4<const N: usize> {
    pub x: LaneGroup<N>,
    pub y: LaneGroup<N>,
    pub z: LaneGroup<N>,
    pub w: LaneGroup<N>,
}

impl<const N: usize> LaneVec4<N> {
    /// Transform `N` points `(x, y, z, 1)` by `m`.
    ///
    /// Matrix columns are broadcast once and reused for every lane:
    /// `out = c0 * x + c1 * y + c2 * z + c3`.
    #[inline(always)]
    pub fn transform_points(
        m: &Mat4,
        x: LaneGroup<N>,
        y: LaneGroup<N>,
        z: LaneGroup<N>,
    ) -> Self {
        let row = |c0: f32, c1: f32, c2: f32, c3: f32| {
            let xy = x.mul_add(LaneGroup::splat(c0), y * c1);
            z.mul_add(LaneGroup::splat(c2), xy) + LaneGroup::splat(c3)
        };
        let (a, b, c, d) = (m.x_axis, m.y_axis, m.z_axis, m.w_axis);
        Self {
            x: row(a.x, b.x, c.x, d.x),
            y: row(a.y, b.y, c.y, d.y),
            z: row(a.z, b.z, c.z, d.z),
            w: row(a.w, b.w, c.w, d.w),
        }
    }

    #[inline(always)]
    pub fn lane(&self, i: usize) -> Vec4 {
        Vec4::new(self.x[i], self.y[i], self.z[i], self.w[i])
    }
}
