use std::fmt::Write;

use super::{Constant, Program};

/// Renders a program as human-readable disassembly: the constant
/// pool, the symbol table, then one line per instruction. Used by the
/// `--show-bytecode` front-end flag.
pub fn disassemble(program: &Program) -> String {
  let mut out = String::new();

  writeln!(out, "constants:").unwrap();
  for (i, c) in program.constants.iter().enumerate() {
    writeln!(out, "  [{i}] {}", format_constant(c)).unwrap();
  }

  writeln!(out, "symbols:").unwrap();
  for s in &program.symbols {
    writeln!(out, "  [{}] {} ({:?})", s.slot_index, s.name, s.symbol_type).unwrap();
  }

  writeln!(out, "instructions:").unwrap();
  for (pc, instr) in program.instructions.iter().enumerate() {
    if instr.opcode.has_operand() {
      writeln!(out, "  {pc:04} {:<14} {}", instr.opcode.mnemonic(), instr.operand).unwrap();
    } else {
      writeln!(out, "  {pc:04} {}", instr.opcode.mnemonic()).unwrap();
    }
  }

  out
}

fn format_constant(c: &Constant) -> String {
  match c {
    Constant::Int(v) => format!("int {v}"),
    Constant::Float(v) => format!("float {v}"),
    Constant::Str(v) => format!("string {v:?}"),
    Constant::Bool(v) => format!("bool {v}"),
  }
}
