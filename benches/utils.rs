use rand::Rng;

/// Elementwise 算子的读写字节数 (in + out, f32)
pub fn elementwise_rw_bytes(n: usize) -> u64 {
    2 * n as u64 * 4
}

/// exp 输入: [-20.0, 20.0)
pub fn random_exp_input(n: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen_range(-20.0..20.0)).collect()
}

/// log 输入: 正规正数, 跨越 1e-20..1e20
pub fn random_log_input(n: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| 10f32.powf(rng.gen_range(-20.0f32..20.0)))
        .collect()
}

pub fn size_label(n: usize) -> String {
    match n {
        1024 => "1K".into(),
        4096 => "4K".into(),
        16384 => "16K".into(),
        65536 => "64K".into(),
        262144 => "256K".into(),
        _ => format!("{n}"),
    }
}
