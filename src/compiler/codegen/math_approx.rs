//! Constant table shared by the exp and log kernels.
//!
//! The table is written once at the start of the code buffer. Generated
//! code reads it through a RIP-relative base plus the `offset_of!` of each
//! field, so the layout is `#[repr(C)]` and must not be reordered.
//!
//! Exp coefficients are an L2 fit of
//! `f(x) = A + Bx + Cx^2 + Dx^3 + Ex^4 + Fx^5` to `exp(x)` over
//! `[-ln2/2, ln2/2]`, evaluated as `P(r) = 1 + r * (c0 + r*(c1 + ... ))`.
//! Max error 1.938668e-6.

use std::mem::offset_of;

pub const EXP_N: usize = 5;
pub const LOG_N: usize = 9;

/// IEEE-754 bit patterns of the exp coefficients.
pub const EXP_COEFF_BITS: [u32; EXP_N] = [
    0x3f80_0000,
    0x3eff_ff12,
    0x3e2a_aa56,
    0x3d2b_89cc,
    0x3c09_1331,
];

/// `log(1 + a) ~ a * (c0 + a*(c1 + ... + a*c8))`, `a` in `[-1/3, 1/3)`.
pub const LOG_COEFF: [f32; LOG_N] = [
    1.0, // must be 1
    -0.499_999_851_959_748_756_812_42,
    0.333_332_205_260_616_777_057_82,
    -0.250_042_062_204_863_900_580_00,
    0.200_109_857_475_100_671_000_77,
    -0.164_815_668_120_938_896_722_03,
    0.139_882_697_356_293_307_630_20,
    -0.150_495_047_060_051_652_940_02,
    0.140_957_114_022_338_034_799_21,
];

/// `1.0f32` shifted into the exponent field: `127 << 23`.
pub const LOG_BIAS_BITS: u32 = 127 << 23;
/// Mantissa field of an f32.
pub const LOG_MANTISSA_MASK: u32 = 0x007f_ffff;
/// Width of the mantissa field.
pub const MANTISSA_BITS: u32 = 23;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstTable {
    /// ln(2)
    pub ln2: f32,
    /// log2(e) = 1 / ln(2)
    pub log2_e: f32,
    /// Near `1/(i+1)!`.
    pub exp_coeff: [f32; EXP_N],
    /// ln(1.5), the log pivot.
    pub log1p5: f32,
    pub two_thirds: f32,
    pub log_coeff: [f32; LOG_N],
}

impl ConstTable {
    /// Derive every entry from the literals above. Deterministic.
    pub fn new() -> Self {
        let ln2 = 2.0f32.ln();
        Self {
            ln2,
            log2_e: 1.0 / ln2,
            exp_coeff: EXP_COEFF_BITS.map(f32::from_bits),
            log1p5: 1.5f32.ln(),
            two_thirds: 2.0f32 / 3.0,
            log_coeff: LOG_COEFF,
        }
    }

    /// Size in bytes, before page rounding.
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

impl Default for ConstTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte offsets of the table fields, as read by generated code.
pub mod offsets {
    use super::*;

    pub const LN2: i32 = offset_of!(ConstTable, ln2) as i32;
    pub const LOG2_E: i32 = offset_of!(ConstTable, log2_e) as i32;
    pub const EXP_COEFF: i32 = offset_of!(ConstTable, exp_coeff) as i32;
    pub const LOG1P5: i32 = offset_of!(ConstTable, log1p5) as i32;
    pub const TWO_THIRDS: i32 = offset_of!(ConstTable, two_thirds) as i32;
    pub const LOG_COEFF: i32 = offset_of!(ConstTable, log_coeff) as i32;

    /// Offset of `exp_coeff[i]`.
    pub const fn exp_coeff(i: usize) -> i32 {
        EXP_COEFF + (i * std::mem::size_of::<f32>()) as i32
    }

    /// Offset of `log_coeff[i]`.
    pub const fn log_coeff(i: usize) -> i32 {
        LOG_COEFF + (i * std::mem::size_of::<f32>()) as i32
    }
}
