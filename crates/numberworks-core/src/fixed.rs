use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Simulation time in milliseconds. Frame deltas, travel times and the
/// production interval are all expressed in this unit.
pub type Millis = u32;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::saturating_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Scale a millisecond duration by a fixed-point factor.
///
/// Saturates instead of overflowing; a factor of one returns `ms` unchanged.
#[inline]
pub fn scale_millis(ms: Millis, factor: Fixed64) -> Fixed64 {
    Fixed64::saturating_from_num(ms).saturating_mul(factor)
}

/// `factor` raised to a non-negative power by square-and-multiply.
///
/// Integer-only steps keep the result bit-identical across platforms, which
/// `powf` does not guarantee.
pub fn pow_fixed(factor: Fixed64, exponent: u32) -> Fixed64 {
    let mut result = Fixed64::ONE;
    let mut base = factor;
    let mut exp = exponent;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.saturating_mul(base);
        }
        base = base.saturating_mul(base);
        exp >>= 1;
    }
    result
}
