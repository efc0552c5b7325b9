//! JIT compilation of the vector exp/log kernels.
//!
//! # Pipeline
//!
//! ```text
//! CodeBuffer::acquire → write ConstTable → emit expf_v → align 16
//!     → emit logf_v → finalize (RW → RX) → CompiledKernels
//! ```
//!
//! Any failure drops the partially built buffer, which restores write
//! access and unmaps it.

pub mod codegen;
#[cfg(unix)]
pub mod executable;

use crate::config::JitConfig;
use crate::types::{FmathError, FmathResult};

#[cfg(all(target_arch = "x86_64", unix))]
pub use self::jit::{compile, CompiledKernels, VecFn};

/// Alignment of each kernel entry point.
pub const KERNEL_ALIGN: usize = 16;

/// Reject targets without a backend before touching memory.
pub fn check_target(config: &JitConfig) -> FmathResult<()> {
    if !config.enabled {
        return Err(FmathError::Disabled);
    }
    if cfg!(all(target_arch = "x86_64", unix)) {
        Ok(())
    } else {
        Err(FmathError::Unsupported(format!(
            "no JIT backend for {} on {}",
            std::env::consts::ARCH,
            std::env::consts::OS
        )))
    }
}

#[cfg(all(target_arch = "x86_64", unix))]
mod jit {
    use super::*;
    use crate::types::KernelKind;
    use crate::compiler::codegen::disasm::disassemble;
    use crate::compiler::codegen::emit_kernel;
    use crate::compiler::codegen::math_approx::ConstTable;
    use crate::compiler::executable::CodeBuffer;

    /// Signature shared by both generated kernels.
    ///
    /// ```text
    /// fn(dst: *mut f32, src: *const f32, n: usize)
    /// ```
    pub type VecFn = unsafe extern "C" fn(*mut f32, *const f32, usize);

    /// Both kernels plus the buffer that owns their code and constants.
    pub struct CompiledKernels {
        buffer: CodeBuffer,
        exp_offset: usize,
        exp_len: usize,
        log_offset: usize,
        log_len: usize,
        expf_v: VecFn,
        logf_v: VecFn,
    }

    impl CompiledKernels {
        pub fn entry(&self, kind: KernelKind) -> VecFn {
            match kind {
                KernelKind::Exp => self.expf_v,
                KernelKind::Log => self.logf_v,
            }
        }

        /// Entry offset of one kernel from the buffer base.
        pub fn offset(&self, kind: KernelKind) -> usize {
            match kind {
                KernelKind::Exp => self.exp_offset,
                KernelKind::Log => self.log_offset,
            }
        }

        /// Code size of one kernel in bytes.
        pub fn code_size(&self, kind: KernelKind) -> usize {
            match kind {
                KernelKind::Exp => self.exp_len,
                KernelKind::Log => self.log_len,
            }
        }

        /// Listing of one kernel as it sits in the buffer.
        pub fn disassemble(&self, kind: KernelKind) -> Vec<String> {
            let (offset, len) = (self.offset(kind), self.code_size(kind));
            let ip = self.buffer.table_addr() + offset as u64;
            disassemble(self.buffer.bytes(offset, len), ip)
        }

        pub fn buffer(&self) -> &CodeBuffer {
            &self.buffer
        }
    }

    impl std::fmt::Debug for CompiledKernels {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("CompiledKernels")
                .field("buffer", &self.buffer)
                .field("exp_offset", &self.exp_offset)
                .field("exp_len", &self.exp_len)
                .field("log_offset", &self.log_offset)
                .field("log_len", &self.log_len)
                .finish()
        }
    }

    fn emit_into(buffer: &mut CodeBuffer, kind: KernelKind, table_addr: u64) -> FmathResult<(usize, usize)> {
        buffer.align(KERNEL_ALIGN)?;
        let code = emit_kernel(kind, buffer.next_ip(), table_addr)?;
        let offset = buffer.append(&code)?;
        Ok((offset, code.len()))
    }

    /// Build both kernels. Does not check that the CPU can run them.
    pub fn compile(config: &JitConfig) -> FmathResult<CompiledKernels> {
        check_target(config)?;

        let mut buffer = CodeBuffer::acquire(config.code_capacity)?;
        let table_addr = buffer.write_table(ConstTable::new())?;
        let (exp_offset, exp_len) = emit_into(&mut buffer, KernelKind::Exp, table_addr)?;
        let (log_offset, log_len) = emit_into(&mut buffer, KernelKind::Log, table_addr)?;
        buffer.finalize()?;

        // SAFETY: both offsets point at complete functions emitted for the
        // VecFn signature, and the buffer is now executable.
        let (expf_v, logf_v) = unsafe {
            (
                std::mem::transmute::<*const u8, VecFn>(buffer.code_ptr(exp_offset)?),
                std::mem::transmute::<*const u8, VecFn>(buffer.code_ptr(log_offset)?),
            )
        };

        let kernels = CompiledKernels {
            buffer,
            exp_offset,
            exp_len,
            log_offset,
            log_len,
            expf_v,
            logf_v,
        };

        log::debug!(
            "fmath JIT: table at {:#x}, {} {} bytes at +{:#x}, {} {} bytes at +{:#x}",
            table_addr,
            KernelKind::Exp,
            exp_len,
            exp_offset,
            KernelKind::Log,
            log_len,
            log_offset,
        );
        if log::log_enabled!(log::Level::Trace) {
            for kind in [KernelKind::Exp, KernelKind::Log] {
                for line in kernels.disassemble(kind) {
                    log::trace!("{kind}: {line}");
                }
            }
        }

        Ok(kernels)
    }
}
