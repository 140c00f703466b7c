//! Compiler and interpreter for a small Python-like language.
//!
//! The pipeline is strictly forward: [`syntax::tokenize`] feeds
//! [`syntax::parse`], whose AST feeds [`emit::generate`], whose
//! [`bytecode::Program`] is either executed directly by [`vm::Interpreter`]
//! or serialized through [`bytecode::save`]/[`bytecode::load`].
//!
//! The command-line front end, REPL, and performance-report
//! formatting live in the separate `cli` crate; this crate only
//! exposes the core compile-and-execute contract.

pub mod bytecode;
pub mod emit;
mod error;
pub mod vm;

pub use error::{Error, Result};

/// Compiles source text all the way to a loaded [`bytecode::Program`],
/// stopping at the first error from either compiler stage.
pub fn compile(src: &str) -> Result<bytecode::Program> {
  let ast = syntax::parse_source(src)?;
  let program = emit::generate(&ast)?;
  Ok(program)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn container_round_trip_preserves_behavior() {
    let src = "n = 5\nf = 1\ni = 1\nwhile i <= n:\n    f = f * i\n    i = i + 1\nprint(f)\n";
    let program = compile(src).unwrap();

    let mut bytes = Vec::new();
    bytecode::save(&program, &mut bytes).unwrap();
    let loaded = bytecode::load(&mut bytes.as_slice()).unwrap();

    let mut out = Vec::new();
    let mut stdin = Cursor::new(Vec::new());
    let mut interp = vm::Interpreter::new(&loaded);
    interp.run(&mut out, &mut stdin).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "120\n");
  }
}
