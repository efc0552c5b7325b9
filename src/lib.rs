//! fmath-kernels: JIT-generated AVX-512 `exp` / `log` over f32 buffers.
//!
//! Two routines are emitted at first use into a private executable buffer:
//!
//! - `expf_v`: `dst[i] = exp(src[i])`, relative error ~2e-6
//! - `logf_v`: `dst[i] = ln(src[i])` for positive normal inputs
//!
//! Both process 16 lanes per step with a masked tail, so any length is
//! accepted without reading or writing past the end of the buffers.
//!
//! # Quick Start
//!
//! ```no_run
//! let src = [0.0f32, 1.0, -1.0, 2.302585];
//! let mut dst = [0.0f32; 4];
//! fmath_kernels::expf_v(&mut dst, &src)?;
//! # Ok::<(), fmath_kernels::FmathError>(())
//! ```
//!
//! Availability is decided once per process: x86_64 unix with AVX-512F and
//! `FMATH_JIT` not set to `off`. Otherwise every call returns the cached
//! [`FmathError`].

pub mod compiler;
pub mod config;
pub mod dispatch;
pub mod kernel_dispatcher;
pub mod types;

pub use config::JitConfig;
pub use dispatch::{avx512_available, get_isa_level, IsaLevel};
pub use kernel_dispatcher::{
    expf_inplace, expf_v, expf_v_raw, global_init_count, is_available, kernels, logf_inplace,
    logf_v, logf_v_raw, VecMathKernels,
};
pub use types::{FmathError, FmathResult, KernelKind, Protection};
