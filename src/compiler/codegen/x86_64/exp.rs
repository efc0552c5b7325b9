//! `expf_v(dst, src, n)`: AVX-512 exp over `n` floats.
//!
//! Per lane:
//! 1. `t = x * log2(e)`, `k = round(t)`
//! 2. `r = (t - k) * ln2`, so `r` lies in `[-ln2/2, ln2/2]`
//! 3. `p = 1 + r*(c0 + r*(c1 + r*(c2 + r*(c3 + r*c4))))` via FMA
//! 4. `exp(x) = p * 2^k` with `vscalefps`
//!
//! Loop tiers: 32 lanes per iteration (two independent groups interleaved),
//! then one 16-lane group if at least 16 remain, then a masked tail of
//! `n & 15` lanes. A zero count at any tier jumps straight to the exit.

use iced_x86::code_asm::*;

use super::{
    assemble, emit_broadcast, emit_epilogue, emit_masked_load, emit_masked_store,
    emit_table_base, emit_tail_mask, new_assembler, ConstRegs, VEC_BYTES,
};
use crate::compiler::codegen::math_approx::{offsets, EXP_N};
use crate::types::FmathResult;

/// `rndscale` imm8: round to nearest even, keep 0 fraction bits.
const ROUND_NEAREST: i32 = 0;

/// Registers for one 16-lane group: input/output, exponent, polynomial.
#[derive(Debug, Clone, Copy)]
struct ExpLanes {
    x: AsmRegisterZmm,
    k: AsmRegisterZmm,
    p: AsmRegisterZmm,
}

/// The two interleaved groups of the main loop; the narrower tiers use the first.
fn lane_groups() -> [ExpLanes; 2] {
    [
        ExpLanes { x: zmm0, k: zmm1, p: zmm2 },
        ExpLanes { x: zmm3, k: zmm4, p: zmm5 },
    ]
}

struct ExpConsts {
    ln2: AsmRegisterZmm,
    log2_e: AsmRegisterZmm,
    coeff: [AsmRegisterZmm; EXP_N],
}

impl ExpConsts {
    fn load(asm: &mut CodeAssembler, regs: &mut ConstRegs) -> FmathResult<Self> {
        let ln2 = regs.take()?;
        let log2_e = regs.take()?;
        emit_broadcast(asm, ln2, offsets::LN2)?;
        emit_broadcast(asm, log2_e, offsets::LOG2_E)?;

        let mut coeff = [zmm0; EXP_N];
        for (i, reg) in coeff.iter_mut().enumerate() {
            *reg = regs.take()?;
            emit_broadcast(asm, *reg, offsets::exp_coeff(i))?;
        }
        Ok(Self { ln2, log2_e, coeff })
    }
}

/// `g.x = exp(g.x)` for every group, each step interleaved across groups.
fn emit_exp_lanes(asm: &mut CodeAssembler, c: &ExpConsts, groups: &[ExpLanes]) -> FmathResult<()> {
    for g in groups {
        asm.vmulps(g.x, g.x, c.log2_e)?;
    }
    for g in groups {
        asm.vrndscaleps(g.k, g.x, ROUND_NEAREST)?;
    }
    for g in groups {
        asm.vsubps(g.x, g.x, g.k)?;
    }
    for g in groups {
        asm.vmulps(g.x, g.x, c.ln2)?;
    }
    for g in groups {
        asm.vmovaps(g.p, c.coeff[4])?;
    }
    for i in [3, 2, 1, 0, 0] {
        for g in groups {
            asm.vfmadd213ps(g.p, g.x, c.coeff[i])?;
        }
    }
    for g in groups {
        asm.vscalefps(g.x, g.p, g.k)?;
    }
    Ok(())
}

/// Emit the exp kernel for execution at `ip`, reading constants at `table_addr`.
pub fn emit_exp_avx512(ip: u64, table_addr: u64) -> FmathResult<Vec<u8>> {
    let mut asm = new_assembler()?;
    let (dst, src, n) = (rdi, rsi, rdx);
    let [group_a, group_b] = lane_groups();

    emit_table_base(&mut asm, table_addr)?;
    let mut regs = ConstRegs::new();
    let c = ExpConsts::load(&mut asm, &mut regs)?;

    let mut lp = asm.create_label();
    let mut mod32 = asm.create_label();
    let mut mod16 = asm.create_label();
    let mut exit = asm.create_label();

    asm.mov(ecx, edx)?;
    asm.and(n, -32i32)?;
    asm.jz(mod32)?;

    asm.set_label(&mut lp)?;
    asm.vmovups(group_a.x, zmmword_ptr(src))?;
    asm.vmovups(group_b.x, zmmword_ptr(src + VEC_BYTES))?;
    asm.add(src, 2 * VEC_BYTES)?;
    emit_exp_lanes(&mut asm, &c, &[group_a, group_b])?;
    asm.vmovups(zmmword_ptr(dst), group_a.x)?;
    asm.vmovups(zmmword_ptr(dst + VEC_BYTES), group_b.x)?;
    asm.add(dst, 2 * VEC_BYTES)?;
    asm.sub(n, 32i32)?;
    asm.jnz(lp)?;

    asm.set_label(&mut mod32)?;
    asm.and(ecx, 31i32)?;
    asm.jz(exit)?;
    asm.cmp(ecx, 16i32)?;
    asm.jb(mod16)?;
    asm.vmovups(group_a.x, zmmword_ptr(src))?;
    asm.add(src, VEC_BYTES)?;
    emit_exp_lanes(&mut asm, &c, &[group_a])?;
    asm.vmovups(zmmword_ptr(dst), group_a.x)?;
    asm.add(dst, VEC_BYTES)?;

    asm.set_label(&mut mod16)?;
    asm.and(ecx, 15i32)?;
    asm.jz(exit)?;
    emit_tail_mask(&mut asm)?;
    emit_masked_load(&mut asm, group_a.x)?;
    emit_exp_lanes(&mut asm, &c, &[group_a])?;
    emit_masked_store(&mut asm, group_a.x)?;

    asm.set_label(&mut exit)?;
    emit_epilogue(&mut asm)?;

    assemble(&mut asm, ip)
}
