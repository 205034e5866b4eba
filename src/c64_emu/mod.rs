//! Commodore 64 playback core.
//!
//! Just the parts a tune needs to make sound: a 6510 that runs the
//! player routine instruction by instruction, the SID engine that turns
//! register contents into samples, and the flat 64 KiB memory both of
//! them work on.

pub mod cpu;
pub mod memory;
pub mod sid;

/// PAL system clock in Hz.
pub const PAL_CPU_CLOCK: f64 = 985_248.0;

/// PAL frame rate; cadence of vsync-driven players.
pub const PAL_FRAME_RATE: f64 = 50.0;

/// Truncate toward zero and wrap into a signed 32-bit integer, the way
/// integer bit operations see a floating-point operand. NaN and the
/// infinities become 0.
#[inline]
pub fn wrap_i32(v: f64) -> i32 {
    if !v.is_finite() {
        return 0;
    }
    v.trunc().rem_euclid(4_294_967_296.0) as u32 as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_i32_truncates_and_wraps() {
        assert_eq!(wrap_i32(1.9), 1);
        assert_eq!(wrap_i32(-1.9), -1);
        assert_eq!(wrap_i32(2_147_483_648.0), i32::MIN);
        assert_eq!(wrap_i32(4_294_967_296.0 + 5.0), 5);
        assert_eq!(wrap_i32(-4_294_967_297.0), -1);
        assert_eq!(wrap_i32(f64::NAN), 0);
        assert_eq!(wrap_i32(f64::INFINITY), 0);
        assert_eq!(wrap_i32(f64::NEG_INFINITY), 0);
    }
}
