//! Kernel code generation.
//!
//! `math_approx` holds the target-independent constant table; the
//! `x86_64` backend emits AVX-512 code that reads it.

pub mod math_approx;

#[cfg(target_arch = "x86_64")]
pub mod disasm;
#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
use crate::types::{FmathResult, KernelKind};

/// Emit one kernel for execution at `ip` against the table at `table_addr`.
#[cfg(target_arch = "x86_64")]
pub fn emit_kernel(kind: KernelKind, ip: u64, table_addr: u64) -> FmathResult<Vec<u8>> {
    match kind {
        KernelKind::Exp => x86_64::exp::emit_exp_avx512(ip, table_addr),
        KernelKind::Log => x86_64::log::emit_log_avx512(ip, table_addr),
    }
}
