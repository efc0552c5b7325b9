//! Error type and shared enums for the JIT math kernels.

use std::fmt;

use thiserror::Error;

/// Protection state of the JIT code buffer.
///
/// The buffer is never writable and executable at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// `PROT_READ | PROT_WRITE`: table initialization and code emission.
    Writable,
    /// `PROT_READ | PROT_EXEC`: every kernel call after `finalize`.
    ExecutableReadable,
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Writable => write!(f, "RW"),
            Self::ExecutableReadable => write!(f, "RX"),
        }
    }
}

/// Which of the two generated routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    Exp,
    Log,
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exp => write!(f, "expf_v"),
            Self::Log => write!(f, "logf_v"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FmathError {
    /// The target or the running CPU cannot execute the generated code.
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("JIT kernels disabled by configuration")]
    Disabled,
    #[error("invalid override {var}={value:?}")]
    InvalidOverride { var: &'static str, value: String },
    #[error("mmap failed for code buffer: {0}")]
    MemoryMap(String),
    #[error("mprotect failed for code buffer: {0}")]
    Protect(String),
    #[error("code emission failed: {0}")]
    Emit(String),
    #[error("code buffer overflow: need {needed} bytes, capacity {capacity}")]
    CodeOverflow { needed: usize, capacity: usize },
    #[error("code buffer is {actual}, operation requires {expected}")]
    WrongProtection { expected: Protection, actual: Protection },
    #[error("length mismatch: dst has {dst} elements, src has {src}")]
    LengthMismatch { dst: usize, src: usize },
}

pub type FmathResult<T> = Result<T, FmathError>;

#[cfg(target_arch = "x86_64")]
impl From<iced_x86::IcedError> for FmathError {
    fn from(err: iced_x86::IcedError) -> Self {
        FmathError::Emit(err.to_string())
    }
}
