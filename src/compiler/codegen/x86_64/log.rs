//! `logf_v(dst, src, n)`: AVX-512 natural log over `n` floats.
//!
//! Per lane, with `bits` the raw IEEE-754 pattern of `x`:
//! 1. `e = float((bits - (127 << 23)) >> 23)` (arithmetic shift),
//!    `m = (bits & 0x7fffff) | (127 << 23)`, so `m` is in `[1, 2)`
//! 2. `a = (2/3) * m - 1`, in `[-1/3, 1/3)`; `e' = e * ln2 + ln(1.5)`
//! 3. `p = c0 + a*(c1 + ... + a*c8)` via 8 FMAs
//! 4. `ln(x) = a * p + e'`
//!
//! Defined for positive normal inputs only. Zero, negative, subnormal,
//! infinite and NaN inputs produce whatever the bit arithmetic yields.
//!
//! Loop tiers: 16 lanes per iteration, then a masked tail of `n & 15` lanes.

use iced_x86::code_asm::*;

use super::{
    assemble, emit_broadcast, emit_broadcast_bits, emit_epilogue, emit_masked_load,
    emit_masked_store, emit_table_base, emit_tail_mask, new_assembler, ConstRegs, LANES,
    VEC_BYTES,
};
use crate::compiler::codegen::math_approx::{
    offsets, LOG_BIAS_BITS, LOG_MANTISSA_MASK, LOG_N, MANTISSA_BITS,
};
use crate::types::FmathResult;

struct LogConsts {
    bias: AsmRegisterZmm,
    mantissa_mask: AsmRegisterZmm,
    ln2: AsmRegisterZmm,
    log1p5: AsmRegisterZmm,
    two_thirds: AsmRegisterZmm,
    coeff: [AsmRegisterZmm; LOG_N],
}

impl LogConsts {
    fn load(asm: &mut CodeAssembler, regs: &mut ConstRegs, table_addr: u64) -> FmathResult<Self> {
        let bias = regs.take()?;
        let mantissa_mask = regs.take()?;
        emit_broadcast_bits(asm, bias, LOG_BIAS_BITS)?;
        emit_broadcast_bits(asm, mantissa_mask, LOG_MANTISSA_MASK)?;

        emit_table_base(asm, table_addr)?;
        let ln2 = regs.take()?;
        let log1p5 = regs.take()?;
        let two_thirds = regs.take()?;
        emit_broadcast(asm, ln2, offsets::LN2)?;
        emit_broadcast(asm, log1p5, offsets::LOG1P5)?;
        emit_broadcast(asm, two_thirds, offsets::TWO_THIRDS)?;

        let mut coeff = [zmm0; LOG_N];
        for (i, reg) in coeff.iter_mut().enumerate() {
            *reg = regs.take()?;
            emit_broadcast(asm, *reg, offsets::log_coeff(i))?;
        }
        Ok(Self { bias, mantissa_mask, ln2, log1p5, two_thirds, coeff })
    }
}

/// `x = ln(x)`, using `e` and `p` as scratch.
fn emit_log_lanes(
    asm: &mut CodeAssembler,
    c: &LogConsts,
    x: AsmRegisterZmm,
    e: AsmRegisterZmm,
    p: AsmRegisterZmm,
) -> FmathResult<()> {
    asm.vpsubd(e, x, c.bias)?;
    asm.vpsrad(e, e, MANTISSA_BITS as i32)?;
    asm.vcvtdq2ps(e, e)?;
    asm.vpandd(x, x, c.mantissa_mask)?;
    asm.vpord(x, x, c.bias)?;

    asm.vfmsub213ps(x, c.two_thirds, c.coeff[0])?; // a
    asm.vfmadd213ps(e, c.ln2, c.log1p5)?; // e'

    asm.vmovaps(p, c.coeff[LOG_N - 1])?;
    for i in (0..LOG_N - 1).rev() {
        asm.vfmadd213ps(p, x, c.coeff[i])?;
    }
    asm.vfmadd213ps(x, p, e)?;
    Ok(())
}

/// Emit the log kernel for execution at `ip`, reading constants at `table_addr`.
pub fn emit_log_avx512(ip: u64, table_addr: u64) -> FmathResult<Vec<u8>> {
    let mut asm = new_assembler()?;
    let (dst, src, n) = (rdi, rsi, rdx);
    let (x, e, p) = (zmm0, zmm1, zmm2);

    let mut regs = ConstRegs::new();
    let c = LogConsts::load(&mut asm, &mut regs, table_addr)?;

    let mut lp = asm.create_label();
    let mut mod16 = asm.create_label();
    let mut exit = asm.create_label();

    asm.mov(ecx, edx)?;
    asm.and(n, -(LANES as i32))?;
    asm.jz(mod16)?;

    asm.set_label(&mut lp)?;
    asm.vmovups(x, zmmword_ptr(src))?;
    asm.add(src, VEC_BYTES)?;
    emit_log_lanes(&mut asm, &c, x, e, p)?;
    asm.vmovups(zmmword_ptr(dst), x)?;
    asm.add(dst, VEC_BYTES)?;
    asm.sub(n, LANES as i32)?;
    asm.jnz(lp)?;

    asm.set_label(&mut mod16)?;
    asm.and(ecx, LANES as i32 - 1)?;
    asm.jz(exit)?;
    emit_tail_mask(&mut asm)?;
    emit_masked_load(&mut asm, x)?;
    emit_log_lanes(&mut asm, &c, x, e, p)?;
    emit_masked_store(&mut asm, x)?;

    asm.set_label(&mut exit)?;
    emit_epilogue(&mut asm)?;

    assemble(&mut asm, ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::codegen::disasm::mnemonics;
    use iced_x86::Mnemonic;

    const IP: u64 = 0x10_0000_1200;
    const TABLE: u64 = 0x10_0000_0000;

    fn count(ms: &[Mnemonic], m: Mnemonic) -> usize {
        ms.iter().filter(|&&x| x == m).count()
    }

    #[test]
    fn test_log_kernel_emits() {
        let code = emit_log_avx512(IP, TABLE).unwrap();
        assert!(!code.is_empty());
        assert!(code.len() < 1024, "log kernel unexpectedly large: {}", code.len());
        assert_eq!(code.last(), Some(&0xC3));
    }

    #[test]
    fn test_log_kernel_instruction_mix() {
        let code = emit_log_avx512(IP, TABLE).unwrap();
        let ms = mnemonics(&code, IP);

        assert_eq!(count(&ms, Mnemonic::Vpbroadcastd), 2);
        assert_eq!(count(&ms, Mnemonic::Vbroadcastss), 3 + LOG_N);
        // One lane group in the loop, one in the masked tail.
        assert_eq!(count(&ms, Mnemonic::Vpsrad), 2);
        assert_eq!(count(&ms, Mnemonic::Vcvtdq2ps), 2);
        assert_eq!(count(&ms, Mnemonic::Vfmsub213ps), 2);
        // e', 8 Horner steps, closing FMA.
        assert_eq!(count(&ms, Mnemonic::Vfmadd213ps), 2 * (1 + (LOG_N - 1) + 1));
        assert_eq!(count(&ms, Mnemonic::Kmovw), 1);
        assert_eq!(count(&ms, Mnemonic::Vscalefps), 0);
        assert_eq!(count(&ms, Mnemonic::Ret), 1);
    }
}
