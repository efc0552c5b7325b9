//! CPU capability probe.
//!
//! The kernels only need one answer: can this CPU run AVX-512F code.
//! Detected once, cached for the process lifetime.

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsaLevel {
    /// No vector ISA the generated kernels can use.
    Scalar,
    Avx512,
}

impl IsaLevel {
    /// Whether the generated `zmm` kernels can run at this level.
    pub fn supports_jit_kernels(self) -> bool {
        matches!(self, IsaLevel::Avx512)
    }
}

static ISA_LEVEL: OnceLock<IsaLevel> = OnceLock::new();

pub fn get_isa_level() -> IsaLevel {
    *ISA_LEVEL.get_or_init(detect_isa_features)
}

/// The "wide-SIMD available" answer.
pub fn avx512_available() -> bool {
    get_isa_level().supports_jit_kernels()
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect_isa_features() -> IsaLevel {
    if is_x86_feature_detected!("avx512f") {
        IsaLevel::Avx512
    } else {
        IsaLevel::Scalar
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn detect_isa_features() -> IsaLevel {
    IsaLevel::Scalar
}
