//! Entry-point registry for the JIT exp/log kernels.
//!
//! `VecMathKernels` is an owned handle: building one maps a code buffer,
//! writes the constant table, emits both kernels and seals the buffer.
//! Dropping it unmaps everything.
//!
//! The process-wide instance lives in a `OnceLock`, built on first use from
//! [`JitConfig::from_env`]. Concurrent first callers block until the single
//! build finishes and then all see the same result. A failed build is cached
//! too: it is logged once and every later call gets the same error.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::compiler::check_target;
#[cfg(all(target_arch = "x86_64", unix))]
use crate::compiler::{compile, CompiledKernels};
use crate::config::JitConfig;
use crate::dispatch::avx512_available;
use crate::types::{FmathError, FmathResult, KernelKind};

/// Global kernels (lazy initialized)
static KERNELS: OnceLock<FmathResult<VecMathKernels>> = OnceLock::new();

/// How many times the global initializer has run.
static GLOBAL_INITS: AtomicUsize = AtomicUsize::new(0);

/// Generated `expf_v` / `logf_v` plus the memory that backs them.
///
/// Calls are pure functions of their input buffers and may run concurrently
/// from any number of threads on disjoint buffers.
#[derive(Debug)]
pub struct VecMathKernels {
    #[cfg(all(target_arch = "x86_64", unix))]
    compiled: CompiledKernels,
    #[cfg(not(all(target_arch = "x86_64", unix)))]
    never: std::convert::Infallible,
}

impl VecMathKernels {
    /// Build with the default configuration.
    pub fn new() -> FmathResult<Self> {
        Self::with_config(&JitConfig::default())
    }

    /// Build after checking that this target and CPU can run the kernels.
    pub fn with_config(config: &JitConfig) -> FmathResult<Self> {
        check_target(config)?;
        if !avx512_available() {
            return Err(FmathError::Unsupported("CPU lacks AVX-512F".into()));
        }
        Self::build(config)
    }

    #[cfg(all(target_arch = "x86_64", unix))]
    fn build(config: &JitConfig) -> FmathResult<Self> {
        Ok(Self { compiled: compile(config)? })
    }

    #[cfg(not(all(target_arch = "x86_64", unix)))]
    fn build(_config: &JitConfig) -> FmathResult<Self> {
        Err(FmathError::Unsupported("no JIT backend for this target".into()))
    }

    /// `dst[i] = exp(src[i])`.
    pub fn exp(&self, dst: &mut [f32], src: &[f32]) -> FmathResult<()> {
        self.apply(KernelKind::Exp, dst, src)
    }

    /// `dst[i] = ln(src[i])` for positive normal `src[i]`.
    ///
    /// Zero, negative, subnormal, infinite and NaN inputs are a precondition
    /// violation: the result for those lanes is meaningless but the call
    /// does not fault.
    pub fn log(&self, dst: &mut [f32], src: &[f32]) -> FmathResult<()> {
        self.apply(KernelKind::Log, dst, src)
    }

    pub fn exp_inplace(&self, buf: &mut [f32]) {
        let ptr = buf.as_mut_ptr();
        // SAFETY: dst == src covers exactly `buf`.
        unsafe { self.call(KernelKind::Exp, ptr, ptr, buf.len()) }
    }

    pub fn log_inplace(&self, buf: &mut [f32]) {
        let ptr = buf.as_mut_ptr();
        // SAFETY: dst == src covers exactly `buf`.
        unsafe { self.call(KernelKind::Log, ptr, ptr, buf.len()) }
    }

    /// Raw `expf_v(dst, src, n)`.
    ///
    /// # Safety
    /// `src` must be valid for `n` reads and `dst` for `n` writes. The two
    /// ranges must be identical or disjoint.
    pub unsafe fn exp_raw(&self, dst: *mut f32, src: *const f32, n: usize) {
        self.call(KernelKind::Exp, dst, src, n)
    }

    /// Raw `logf_v(dst, src, n)`.
    ///
    /// # Safety
    /// Same contract as [`VecMathKernels::exp_raw`].
    pub unsafe fn log_raw(&self, dst: *mut f32, src: *const f32, n: usize) {
        self.call(KernelKind::Log, dst, src, n)
    }

    /// Generated code size in bytes.
    pub fn code_size(&self, kind: KernelKind) -> usize {
        #[cfg(all(target_arch = "x86_64", unix))]
        {
            self.compiled.code_size(kind)
        }
        #[cfg(not(all(target_arch = "x86_64", unix)))]
        {
            let _ = kind;
            match self.never {}
        }
    }

    /// NASM listing of a generated kernel.
    pub fn disassemble(&self, kind: KernelKind) -> Vec<String> {
        #[cfg(all(target_arch = "x86_64", unix))]
        {
            self.compiled.disassemble(kind)
        }
        #[cfg(not(all(target_arch = "x86_64", unix)))]
        {
            let _ = kind;
            match self.never {}
        }
    }

    fn apply(&self, kind: KernelKind, dst: &mut [f32], src: &[f32]) -> FmathResult<()> {
        if dst.len() != src.len() {
            return Err(FmathError::LengthMismatch { dst: dst.len(), src: src.len() });
        }
        // SAFETY: both slices hold `src.len()` elements, and `&mut` excludes overlap.
        unsafe { self.call(kind, dst.as_mut_ptr(), src.as_ptr(), src.len()) };
        Ok(())
    }

    unsafe fn call(&self, kind: KernelKind, dst: *mut f32, src: *const f32, n: usize) {
        #[cfg(all(target_arch = "x86_64", unix))]
        {
            (self.compiled.entry(kind))(dst, src, n)
        }
        #[cfg(not(all(target_arch = "x86_64", unix)))]
        {
            let _ = (kind, dst, src, n);
            match self.never {}
        }
    }
}

fn init_global() -> FmathResult<VecMathKernels> {
    GLOBAL_INITS.fetch_add(1, Ordering::SeqCst);
    let result = JitConfig::from_env().and_then(|config| VecMathKernels::with_config(&config));
    match &result {
        Ok(kernels) => log::debug!(
            "fmath JIT kernels ready: {} {} bytes, {} {} bytes",
            KernelKind::Exp,
            kernels.code_size(KernelKind::Exp),
            KernelKind::Log,
            kernels.code_size(KernelKind::Log),
        ),
        Err(err) => log::warn!("fmath JIT kernels unavailable: {err}"),
    }
    result
}

/// The process-wide kernels, built on first call.
pub fn kernels() -> FmathResult<&'static VecMathKernels> {
    KERNELS.get_or_init(init_global).as_ref().map_err(Clone::clone)
}

/// Whether [`expf_v`] / [`logf_v`] can be used. Triggers initialization.
pub fn is_available() -> bool {
    kernels().is_ok()
}

/// Number of times the global initializer has run (0 or 1).
pub fn global_init_count() -> usize {
    GLOBAL_INITS.load(Ordering::SeqCst)
}

/// `dst[i] = exp(src[i])` through the global kernels.
pub fn expf_v(dst: &mut [f32], src: &[f32]) -> FmathResult<()> {
    kernels()?.exp(dst, src)
}

/// `dst[i] = ln(src[i])` through the global kernels. See [`VecMathKernels::log`].
pub fn logf_v(dst: &mut [f32], src: &[f32]) -> FmathResult<()> {
    kernels()?.log(dst, src)
}

pub fn expf_inplace(buf: &mut [f32]) -> FmathResult<()> {
    kernels()?.exp_inplace(buf);
    Ok(())
}

pub fn logf_inplace(buf: &mut [f32]) -> FmathResult<()> {
    kernels()?.log_inplace(buf);
    Ok(())
}

/// Raw-pointer `expf_v`.
///
/// # Safety
/// See [`VecMathKernels::exp_raw`].
pub unsafe fn expf_v_raw(dst: *mut f32, src: *const f32, n: usize) -> FmathResult<()> {
    kernels()?.exp_raw(dst, src, n);
    Ok(())
}

/// Raw-pointer `logf_v`.
///
/// # Safety
/// See [`VecMathKernels::exp_raw`].
pub unsafe fn logf_v_raw(dst: *mut f32, src: *const f32, n: usize) -> FmathResult<()> {
    kernels()?.log_raw(dst, src, n);
    Ok(())
}
