//! Disassembly of emitted kernels, for trace logging and tests.

use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, Mnemonic, NasmFormatter};

/// Safety limit on decoded instructions.
const MAX_INSTRUCTIONS: usize = 1000;

/// NASM-syntax listing, one `address: text` line per instruction.
pub fn disassemble(code: &[u8], ip: u64) -> Vec<String> {
    let mut decoder = Decoder::with_ip(64, code, ip, DecoderOptions::NONE);
    let mut formatter = NasmFormatter::new();
    let mut instr = Instruction::default();
    let mut text = String::new();
    let mut lines = Vec::new();

    while decoder.can_decode() && lines.len() < MAX_INSTRUCTIONS {
        decoder.decode_out(&mut instr);
        text.clear();
        formatter.format(&instr, &mut text);
        lines.push(format!("{:016X}: {}", instr.ip(), text));
    }
    lines
}

/// Mnemonic sequence of `code`.
pub fn mnemonics(code: &[u8], ip: u64) -> Vec<Mnemonic> {
    let mut decoder = Decoder::with_ip(64, code, ip, DecoderOptions::NONE);
    let mut instr = Instruction::default();
    let mut out = Vec::new();

    while decoder.can_decode() && out.len() < MAX_INSTRUCTIONS {
        decoder.decode_out(&mut instr);
        out.push(instr.mnemonic());
    }
    out
}
