//! 16-bit depth quantization.
//!
//! Normalized depth lives in [0, 1] with 1 at the near plane and 0 at the far
//! plane, so larger stored values are nearer and a plain integer `max`
//! accumulates occluders. The float is scaled by 2^-95 so that [0, 1) lands in
//! exponents 0..=31; dropping the low 12 bits of the IEEE pattern then leaves
//! 5 exponent bits and 11 mantissa bits in a `u16`. Precision is relative, so
//! discrimination is finest close to the far end of the reversed range and
//! stays at ~1/2048 of the value everywhere else.

/// Stored value of an empty (cleared) pixel: nothing occludes anything.
pub const DEPTH_CLEAR: u16 = 0;

/// 2^-95, applied before truncating the bit pattern.
pub const FLOAT_COMPRESSION_BIAS: f32 = 2.524_354_9e-29;

/// 2^95, the exact inverse of `FLOAT_COMPRESSION_BIAS`.
pub const FLOAT_DECOMPRESSION_BIAS: f32 = 3.961_408_1e28;

const MANTISSA_SHIFT: u32 = 12;

/// Quantize a normalized depth. Values outside [0, 1] (and NaN) are clamped
/// first; the result truncates towards the far plane.
#[inline(always)]
pub fn compress(depth: f32) -> u16 {
    let d = if depth > 0.0 { depth.min(1.0) } else { 0.0 };
    let bits = (d * FLOAT_COMPRESSION_BIAS).to_bits() >> MANTISSA_SHIFT;
    bits.min(u16::MAX as u32) as u16
}

/// Expand a stored value back to normalized depth.
#[inline(always)]
pub fn decompress_float(depth: u16) -> f32 {
    f32::from_bits((depth as u32) << MANTISSA_SHIFT) * FLOAT_DECOMPRESSION_BIAS
}
