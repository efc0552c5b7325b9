//! AVX-512 kernel emission via iced-x86 CodeAssembler.
//!
//! Both kernels share one signature and register convention (System V AMD64):
//!
//! ```text
//! extern "C" fn(dst: *mut f32, src: *const f32, n: usize)
//!   rdi = dst, rsi = src, rdx = n (remaining full-vector elements)
//!   rcx = n low bits (tail count, cl drives the mask shift)
//!   rax = constant table base, then mask scratch
//!   k1  = tail mask
//! ```
//!
//! Working values live in `zmm0..zmm5`; broadcast constants live in
//! `zmm16..zmm31`. All of these are caller-saved, so the kernels need no
//! prologue and no stack frame.

pub mod exp;
pub mod log;

use iced_x86::code_asm::*;
use iced_x86::{Code, Instruction, MemoryOperand, Register};

use crate::types::{FmathError, FmathResult};

/// f32 lanes per zmm register.
pub const LANES: usize = 16;
/// Bytes per zmm register.
pub const VEC_BYTES: i32 = 64;

/// Map a register index 0..31 to iced-x86 AsmRegisterZmm.
pub fn zmm_reg(idx: u8) -> FmathResult<AsmRegisterZmm> {
    let reg = match idx {
        0 => zmm0,
        1 => zmm1,
        2 => zmm2,
        3 => zmm3,
        4 => zmm4,
        5 => zmm5,
        6 => zmm6,
        7 => zmm7,
        8 => zmm8,
        9 => zmm9,
        10 => zmm10,
        11 => zmm11,
        12 => zmm12,
        13 => zmm13,
        14 => zmm14,
        15 => zmm15,
        16 => zmm16,
        17 => zmm17,
        18 => zmm18,
        19 => zmm19,
        20 => zmm20,
        21 => zmm21,
        22 => zmm22,
        23 => zmm23,
        24 => zmm24,
        25 => zmm25,
        26 => zmm26,
        27 => zmm27,
        28 => zmm28,
        29 => zmm29,
        30 => zmm30,
        31 => zmm31,
        _ => return Err(FmathError::Emit(format!("zmm index {idx} out of range (0..31)"))),
    };
    Ok(reg)
}

/// Hands out constant registers upward from `zmm16`.
pub(crate) struct ConstRegs {
    next: u8,
}

impl ConstRegs {
    pub(crate) fn new() -> Self {
        Self { next: 16 }
    }

    pub(crate) fn take(&mut self) -> FmathResult<AsmRegisterZmm> {
        let reg = zmm_reg(self.next)?;
        self.next += 1;
        Ok(reg)
    }
}

pub(crate) fn new_assembler() -> FmathResult<CodeAssembler> {
    Ok(CodeAssembler::new(64)?)
}

/// `lea rax, [rip + table]`. The displacement is resolved against the final
/// instruction address when the block is assembled at its real `ip`.
pub(crate) fn emit_table_base(asm: &mut CodeAssembler, table_addr: u64) -> FmathResult<()> {
    let lea = Instruction::with2(
        Code::Lea_r64_m,
        Register::RAX,
        MemoryOperand::with_base_displ(Register::RIP, table_addr as i64),
    )?;
    asm.add_instruction(lea)?;
    Ok(())
}

/// `vbroadcastss dst, [rax + offset]`.
pub(crate) fn emit_broadcast(
    asm: &mut CodeAssembler,
    dst: AsmRegisterZmm,
    offset: i32,
) -> FmathResult<()> {
    asm.vbroadcastss(dst, dword_ptr(rax + offset))?;
    Ok(())
}

/// Broadcast a 32-bit immediate pattern into every lane.
pub(crate) fn emit_broadcast_bits(
    asm: &mut CodeAssembler,
    dst: AsmRegisterZmm,
    bits: u32,
) -> FmathResult<()> {
    asm.mov(eax, bits)?;
    asm.vpbroadcastd(dst, eax)?;
    Ok(())
}

/// `k1 = (1 << ecx) - 1`.
///
/// Only reached with `ecx` in `1..LANES`: every caller branches to the exit
/// label on a zero count first.
pub(crate) fn emit_tail_mask(asm: &mut CodeAssembler) -> FmathResult<()> {
    asm.mov(eax, 1i32)?;
    asm.shl(eax, cl)?;
    asm.sub(eax, 1i32)?;
    asm.kmovw(k1, eax)?;
    Ok(())
}

/// Masked load of `k1` lanes from `[rsi]`; inactive lanes are zeroed and never read.
pub(crate) fn emit_masked_load(asm: &mut CodeAssembler, dst: AsmRegisterZmm) -> FmathResult<()> {
    asm.vmovups(dst.k1().z(), zmmword_ptr(rsi))?;
    Ok(())
}

/// Masked store of `k1` lanes to `[rdi]`; inactive lanes are never written.
pub(crate) fn emit_masked_store(asm: &mut CodeAssembler, src: AsmRegisterZmm) -> FmathResult<()> {
    asm.vmovups(zmmword_ptr(rdi).k1(), src)?;
    Ok(())
}

pub(crate) fn emit_epilogue(asm: &mut CodeAssembler) -> FmathResult<()> {
    asm.vzeroupper()?;
    asm.ret()?;
    Ok(())
}

/// Encode at the address the code will execute from.
pub(crate) fn assemble(asm: &mut CodeAssembler, ip: u64) -> FmathResult<Vec<u8>> {
    Ok(asm.assemble(ip)?)
}
