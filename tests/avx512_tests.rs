//! AVX-512 end-to-end validation of the generated exp/log kernels.
//!
//! Each test runtime-detects AVX-512 support and skips gracefully on
//! hardware without it. When AVX-512 is available, tests call the JIT
//! kernels and verify numerical correctness against f64 references.

#![cfg(all(target_arch = "x86_64", unix))]

use fmath_kernels::{
    expf_inplace, expf_v, expf_v_raw, global_init_count, is_available, logf_inplace, logf_v,
    logf_v_raw, FmathError, KernelKind, VecMathKernels,
};

// ═══════════════════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════════════════

macro_rules! skip_without_avx512 {
    () => {
        if !std::is_x86_feature_detected!("avx512f") {
            eprintln!("AVX-512 not supported on this CPU, skipping");
            return;
        }
        if !is_available() {
            eprintln!("JIT kernels disabled, skipping");
            return;
        }
    };
}

/// Lanes per step plus one: enough slack to catch any over-write.
const GUARD: usize = 17;
const SENTINEL: f32 = -12345.5;

fn exp_rel_err(got: f32, x: f32) -> f64 {
    let want = (x as f64).exp();
    ((got as f64 - want) / want).abs()
}

/// Absolute error, relative once `|ln x| > 1`.
fn log_scaled_err(got: f32, x: f32) -> f64 {
    let want = (x as f64).ln();
    (got as f64 - want).abs() / want.abs().max(1.0)
}

fn assert_exp_close(dst: &[f32], src: &[f32], tol: f64) {
    for (i, (&got, &x)) in dst.iter().zip(src).enumerate() {
        let err = exp_rel_err(got, x);
        assert!(err <= tol, "exp({x}) lane {i}: got {got}, rel err {err:e}");
    }
}

fn assert_log_close(dst: &[f32], src: &[f32], tol: f64) {
    for (i, (&got, &x)) in dst.iter().zip(src).enumerate() {
        let err = log_scaled_err(got, x);
        assert!(err <= tol, "ln({x}) lane {i}: got {got}, err {err:e}");
    }
}

fn assert_guard_intact(buf: &[f32], n: usize) {
    for (i, v) in buf[n..].iter().enumerate() {
        assert_eq!(v.to_bits(), SENTINEL.to_bits(), "n={n}: guard lane {i} overwritten");
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Concrete scenarios
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_exp_known_values() {
    skip_without_avx512!();

    let src = [0.0f32, 1.0, -1.0, 2.302585];
    let mut dst = [0.0f32; 4];
    expf_v(&mut dst, &src).unwrap();

    let want = [1.0f32, 2.718282, 0.367879, 10.0];
    for (got, want) in dst.iter().zip(want) {
        assert!((got - want).abs() <= want * 1e-5, "got {got}, want {want}");
    }
}

#[test]
fn test_log_known_values() {
    skip_without_avx512!();

    let src = [1.0f32, 2.718282, 10.0, 0.5];
    let mut dst = [0.0f32; 4];
    logf_v(&mut dst, &src).unwrap();

    let want = [0.0f32, 1.0, 2.302585, -0.693147];
    for (got, want) in dst.iter().zip(want) {
        assert!((got - want).abs() <= 1e-5, "got {got}, want {want}");
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Accuracy
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_exp_accuracy_sweep() {
    skip_without_avx512!();

    let src: Vec<f32> = (-20_000..=20_000).map(|i| i as f32 * 1e-3).collect();
    let mut dst = vec![0.0f32; src.len()];
    expf_v(&mut dst, &src).unwrap();
    assert_exp_close(&dst, &src, 5e-6);
}

#[test]
fn test_exp_wide_range() {
    skip_without_avx512!();

    let src: Vec<f32> = (-800..=800).map(|i| i as f32 * 0.1).collect();
    let mut dst = vec![0.0f32; src.len()];
    expf_v(&mut dst, &src).unwrap();
    // Rounding of x * log2(e) grows with |x|.
    assert_exp_close(&dst, &src, 1e-5);
    assert!(dst.iter().all(|v| v.is_finite() && *v > 0.0));
}

#[test]
fn test_log_accuracy_sweep() {
    skip_without_avx512!();

    let mut src = Vec::new();
    let mut x = 1e-30f32;
    while x < 1e30 {
        src.push(x);
        x *= 1.0137;
    }
    let mut dst = vec![0.0f32; src.len()];
    logf_v(&mut dst, &src).unwrap();
    assert_log_close(&dst, &src, 4e-6);
}

#[test]
fn test_log_near_one() {
    skip_without_avx512!();

    let src: Vec<f32> = (1..=4000).map(|i| 0.5 + i as f32 * 2.5e-4).collect();
    let mut dst = vec![0.0f32; src.len()];
    logf_v(&mut dst, &src).unwrap();
    assert_log_close(&dst, &src, 4e-6);
}

// ═══════════════════════════════════════════════════════════════════════
// Loop tiers and masked tail
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_exp_every_length_to_seventy() {
    skip_without_avx512!();

    for n in 0..=70usize {
        let src: Vec<f32> = (0..n).map(|i| i as f32 * 0.37 - 12.0).collect();
        let mut dst = vec![SENTINEL; n + GUARD];
        expf_v(&mut dst[..n], &src).unwrap();
        assert_exp_close(&dst[..n], &src, 5e-6);
        assert_guard_intact(&dst, n);
    }
}

#[test]
fn test_log_every_length_to_seventy() {
    skip_without_avx512!();

    for n in 0..=70usize {
        let src: Vec<f32> = (0..n).map(|i| 0.01 + i as f32 * 1.73).collect();
        let mut dst = vec![SENTINEL; n + GUARD];
        logf_v(&mut dst[..n], &src).unwrap();
        assert_log_close(&dst[..n], &src, 4e-6);
        assert_guard_intact(&dst, n);
    }
}

#[test]
fn test_tier_boundaries_large() {
    skip_without_avx512!();

    // Around the 32-lane main loop, the 16-lane step and the masked tail.
    for n in [95usize, 96, 97, 111, 112, 113, 127, 128, 129, 1023, 1024, 1025] {
        let src: Vec<f32> = (0..n).map(|i| ((i * 7919) % 4001) as f32 * 1e-2 - 20.0).collect();
        let mut dst = vec![SENTINEL; n + GUARD];
        expf_v(&mut dst[..n], &src).unwrap();
        assert_exp_close(&dst[..n], &src, 5e-6);
        assert_guard_intact(&dst, n);

        let pos: Vec<f32> = src.iter().map(|x| x.exp()).collect();
        let mut ln = vec![SENTINEL; n + GUARD];
        logf_v(&mut ln[..n], &pos).unwrap();
        assert_log_close(&ln[..n], &pos, 4e-6);
        assert_guard_intact(&ln, n);
    }
}

#[test]
fn test_zero_length_touches_nothing() {
    skip_without_avx512!();

    let mut dst = [SENTINEL; 4];
    expf_v(&mut dst[..0], &[]).unwrap();
    logf_v(&mut dst[..0], &[]).unwrap();
    assert_guard_intact(&dst, 0);

    let dangling = std::ptr::NonNull::<f32>::dangling().as_ptr();
    unsafe {
        expf_v_raw(dangling, dangling, 0).unwrap();
        logf_v_raw(dangling, dangling, 0).unwrap();
    }
}

/// `n` floats ending exactly at a page boundary, followed by an inaccessible page.
struct GuardPage {
    base: *mut u8,
    page: usize,
}

impl GuardPage {
    fn new() -> Self {
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                2 * page,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(base, libc::MAP_FAILED);
        let ret = unsafe { libc::mprotect((base as *mut u8).add(page) as *mut _, page, libc::PROT_NONE) };
        assert_eq!(ret, 0);
        Self { base: base as *mut u8, page }
    }

    fn tail(&mut self, n: usize) -> &mut [f32] {
        let bytes = n * std::mem::size_of::<f32>();
        unsafe { std::slice::from_raw_parts_mut(self.base.add(self.page - bytes) as *mut f32, n) }
    }
}

impl Drop for GuardPage {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut _, 2 * self.page);
        }
    }
}

#[test]
fn test_masked_tail_never_faults_at_page_end() {
    skip_without_avx512!();

    for n in [1usize, 7, 15, 17, 31, 33, 49] {
        let src: Vec<f32> = (0..n).map(|i| 0.5 + i as f32).collect();
        let mut src_page = GuardPage::new();
        let mut dst_page = GuardPage::new();
        src_page.tail(n).copy_from_slice(&src);

        let input = src_page.tail(n);
        let output = dst_page.tail(n);
        expf_v(output, input).unwrap();
        assert_exp_close(output, &src, 1e-5);

        logf_inplace(output).unwrap();
        for (got, want) in output.iter().zip(&src) {
            assert!((got - want).abs() <= 1e-4 * want.max(1.0), "{got} vs {want}");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// In-place and raw entry points
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_inplace_matches_out_of_place() {
    skip_without_avx512!();

    let src: Vec<f32> = (0..333).map(|i| (i as f32 - 166.0) * 0.11).collect();
    let mut out = vec![0.0f32; src.len()];
    expf_v(&mut out, &src).unwrap();
    let mut buf = src.clone();
    expf_inplace(&mut buf).unwrap();
    assert_eq!(
        out.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
        buf.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
    );

    let pos: Vec<f32> = out.clone();
    let mut ln = vec![0.0f32; pos.len()];
    logf_v(&mut ln, &pos).unwrap();
    let mut buf = pos;
    logf_inplace(&mut buf).unwrap();
    assert_eq!(
        ln.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
        buf.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
    );
}

#[test]
fn test_raw_matches_slice_api() {
    skip_without_avx512!();

    let src: Vec<f32> = (1..=50).map(|i| i as f32 * 0.3).collect();
    let mut safe = vec![0.0f32; src.len()];
    let mut raw = vec![0.0f32; src.len()];
    logf_v(&mut safe, &src).unwrap();
    unsafe { logf_v_raw(raw.as_mut_ptr(), src.as_ptr(), src.len()).unwrap() };
    assert_eq!(safe, raw);
}

#[test]
fn test_length_mismatch_rejected() {
    skip_without_avx512!();

    let mut dst = [0.0f32; 5];
    assert_eq!(
        logf_v(&mut dst, &[1.0; 6]),
        Err(FmathError::LengthMismatch { dst: 5, src: 6 })
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Concurrency and owned handles
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_concurrent_calls_on_disjoint_buffers() {
    skip_without_avx512!();

    std::thread::scope(|s| {
        for t in 0..8 {
            s.spawn(move || {
                let src: Vec<f32> = (0..1000 + t).map(|i| (i as f32 + t as f32) * 1e-2).collect();
                let mut dst = vec![0.0f32; src.len()];
                expf_v(&mut dst, &src).unwrap();
                assert_exp_close(&dst, &src, 5e-6);
            });
        }
    });
}

#[test]
fn test_owned_handles_are_independent() {
    skip_without_avx512!();

    let a = VecMathKernels::new().unwrap();
    let b = VecMathKernels::new().unwrap();
    assert_eq!(a.code_size(KernelKind::Exp), b.code_size(KernelKind::Exp));
    assert!(a.disassemble(KernelKind::Log).iter().any(|l| l.contains("vfmsub213ps")));

    let src = [0.25f32; 40];
    let mut dst = [0.0f32; 40];
    drop(a);
    b.exp(&mut dst, &src).unwrap();
    assert_exp_close(&dst, &src, 5e-6);
    drop(b);

    // The global instance is untouched by owned handles coming and going.
    expf_v(&mut dst, &src).unwrap();
    assert_eq!(global_init_count(), 1);
}
