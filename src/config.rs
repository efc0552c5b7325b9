//! JIT configuration and environment overrides.
//!
//! | Variable | Values | Effect |
//! |---|---|---|
//! | `FMATH_JIT` | `on`, `off`, `auto` | `off` leaves the kernels unavailable |
//! | `FMATH_JIT_CODE_BYTES` | integer in `1..=2^30` | size hint for the code area |

use std::env;

use crate::types::{FmathError, FmathResult};

pub const ENV_JIT: &str = "FMATH_JIT";
pub const ENV_CODE_BYTES: &str = "FMATH_JIT_CODE_BYTES";

/// Largest accepted code area hint.
pub const MAX_CODE_CAPACITY: usize = 1 << 30;

/// Default code area: two pages, enough for both kernels with room to spare.
pub const DEFAULT_CODE_CAPACITY: usize = 4096 * 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitConfig {
    /// Build the kernels at all.
    pub enabled: bool,
    /// Bytes reserved for generated instructions, excluding the constant table page.
    pub code_capacity: usize,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            code_capacity: DEFAULT_CODE_CAPACITY,
        }
    }
}

impl JitConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> FmathResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`JitConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> FmathResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_JIT) {
            let trimmed = value.trim();
            if trimmed.eq_ignore_ascii_case("off") {
                config.enabled = false;
            } else if trimmed.eq_ignore_ascii_case("on") || trimmed.eq_ignore_ascii_case("auto") {
                config.enabled = true;
            } else {
                return Err(FmathError::InvalidOverride { var: ENV_JIT, value });
            }
        }

        if let Some(value) = lookup(ENV_CODE_BYTES) {
            let bytes = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&b| b > 0 && b <= MAX_CODE_CAPACITY)
                .ok_or_else(|| FmathError::InvalidOverride { var: ENV_CODE_BYTES, value: value.clone() })?;
            config.code_capacity = bytes;
        }

        Ok(config)
    }
}
