//! Single-pass code generation: walks the AST once, emitting a flat
//! instruction vector, a constant pool, and a symbol table, and
//! back-patching forward jumps as their targets become known.

use std::collections::HashMap;

use beef::lean::Cow;
use span::Span;
use syntax::ast::{BinaryOp, Expr, Number, Program as Ast, Stmt, UnaryOp};

use crate::bytecode::{Constant, Instruction, Opcode, Program, Symbol, SymbolType};

#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct CodeGenError {
  pub message: Cow<'static, str>,
  pub span: Span,
}

impl CodeGenError {
  fn new(message: impl Into<Cow<'static, str>>, span: impl Into<Span>) -> Self {
    CodeGenError {
      message: message.into(),
      span: span.into(),
    }
  }

  pub fn report<'a>(&self, source: impl Into<diag::Source<'a>>) -> String {
    diag::Report::error()
      .source(source)
      .message(format!("{self}"))
      .span(self.span)
      .build()
      .emit_to_string()
      .unwrap()
  }
}

type GResult<T> = Result<T, CodeGenError>;

/// Lowers a parsed program to a flat bytecode program.
pub fn generate(ast: &Ast) -> GResult<Program> {
  let mut gen = Generator::default();
  for stmt in &ast.statements {
    gen.lower_stmt(stmt)?;
  }
  gen.emit(Instruction::bare(Opcode::Halt));
  Ok(gen.into_program())
}

#[derive(Default)]
struct Generator {
  constants: Vec<Constant>,
  symbols: Vec<Symbol>,
  instructions: Vec<Instruction>,
  var_slots: HashMap<String, u32>,
}

impl Generator {
  fn into_program(self) -> Program {
    Program {
      constants: self.constants,
      symbols: self.symbols,
      instructions: self.instructions,
    }
  }

  fn emit(&mut self, instr: Instruction) -> usize {
    self.instructions.push(instr);
    self.instructions.len() - 1
  }

  /// A placeholder jump: operand `0`, patched once the target is
  /// known. Returns the instruction's own index.
  fn emit_jump(&mut self, opcode: Opcode) -> usize {
    self.emit(Instruction::new(opcode, 0))
  }

  fn patch_jump(&mut self, at: usize) {
    let target = self.instructions.len() as u8;
    self.instructions[at].operand = target;
  }

  fn const_index(&mut self, value: Constant) -> u32 {
    if let Some(idx) = self.constants.iter().position(|c| *c == value) {
      return idx as u32;
    }
    self.constants.push(value);
    (self.constants.len() - 1) as u32
  }

  fn var_slot(&mut self, name: &str) -> u32 {
    if let Some(slot) = self.var_slots.get(name) {
      return *slot;
    }
    let slot = self.var_slots.len() as u32;
    self.var_slots.insert(name.to_string(), slot);
    self.symbols.push(Symbol {
      name: name.to_string(),
      symbol_type: SymbolType::Var,
      slot_index: slot,
    });
    slot
  }

  fn lower_stmt(&mut self, stmt: &span::Spanned<Stmt>) -> GResult<()> {
    match &**stmt {
      Stmt::Assignment { name, value } => {
        self.lower_expr(value)?;
        let slot = self.var_slot(name);
        self.emit(Instruction::new(Opcode::StoreVar, slot as u8));
        Ok(())
      }
      Stmt::ExpressionStatement(expr) => {
        let is_bare_print = matches!(&**expr, Expr::FunctionCall { name, .. } if name == "print");
        self.lower_expr(expr)?;
        if !is_bare_print {
          self.emit(Instruction::bare(Opcode::Pop));
        }
        Ok(())
      }
      Stmt::IfStatement {
        cond,
        then_branch,
        else_branch,
      } => {
        self.lower_expr(cond)?;
        let j1 = self.emit_jump(Opcode::JumpIfFalse);
        for s in then_branch {
          self.lower_stmt(s)?;
        }
        if let Some(else_branch) = else_branch {
          let j2 = self.emit_jump(Opcode::Jump);
          self.patch_jump(j1);
          for s in else_branch {
            self.lower_stmt(s)?;
          }
          self.patch_jump(j2);
        } else {
          self.patch_jump(j1);
        }
        Ok(())
      }
      Stmt::WhileStatement { cond, body } => {
        let loop_start = self.instructions.len() as u8;
        self.lower_expr(cond)?;
        let jexit = self.emit_jump(Opcode::JumpIfFalse);
        for s in body {
          self.lower_stmt(s)?;
        }
        self.emit(Instruction::new(Opcode::Jump, loop_start));
        self.patch_jump(jexit);
        Ok(())
      }
      Stmt::ReturnStatement(value) => {
        match value {
          Some(v) => self.lower_expr(v)?,
          None => {
            let idx = self.const_index(Constant::Int(0));
            self.emit(Instruction::new(Opcode::LoadConst, idx as u8));
          }
        }
        self.emit(Instruction::bare(Opcode::Return));
        Ok(())
      }
      Stmt::FunctionDef { .. } => Err(CodeGenError::new("user functions not implemented", stmt.span)),
    }
  }

  fn lower_expr(&mut self, expr: &span::Spanned<Expr>) -> GResult<()> {
    match &**expr {
      Expr::NumberLiteral(Number::Int(v)) => {
        let idx = self.const_index(Constant::Int(*v));
        self.emit(Instruction::new(Opcode::LoadConst, idx as u8));
      }
      Expr::NumberLiteral(Number::Float(v)) => {
        let idx = self.const_index(Constant::Float(*v));
        self.emit(Instruction::new(Opcode::LoadConst, idx as u8));
      }
      Expr::StringLiteral(s) => {
        let idx = self.const_index(Constant::Str(s.clone()));
        self.emit(Instruction::new(Opcode::LoadConst, idx as u8));
      }
      Expr::BooleanLiteral(b) => {
        let idx = self.const_index(Constant::Bool(*b));
        self.emit(Instruction::new(Opcode::LoadConst, idx as u8));
      }
      Expr::Identifier(name) => {
        let slot = self.var_slot(name);
        self.emit(Instruction::new(Opcode::LoadVar, slot as u8));
      }
      Expr::BinaryOperation { left, op, right } => {
        self.lower_expr(left)?;
        self.lower_expr(right)?;
        self.emit(Instruction::bare(binary_opcode(op)));
      }
      Expr::UnaryOperation { op, operand } => match op {
        UnaryOp::Neg => {
          self.lower_expr(operand)?;
          self.emit(Instruction::bare(Opcode::Neg));
        }
        UnaryOp::Pos => {
          self.lower_expr(operand)?;
        }
        UnaryOp::Not => {
          self.lower_expr(operand)?;
          let idx = self.const_index(Constant::Bool(false));
          self.emit(Instruction::new(Opcode::LoadConst, idx as u8));
          self.emit(Instruction::bare(Opcode::CmpEq));
        }
      },
      Expr::FunctionCall { name, args } => match name.as_str() {
        "print" => {
          if args.len() != 1 {
            return Err(CodeGenError::new("wrong arity for built-in", expr.span));
          }
          self.lower_expr(&args[0])?;
          self.emit(Instruction::bare(Opcode::Print));
        }
        "input" => {
          if !args.is_empty() {
            return Err(CodeGenError::new("wrong arity for built-in", expr.span));
          }
          self.emit(Instruction::bare(Opcode::Input));
        }
        _ => return Err(CodeGenError::new("unknown function", expr.span)),
      },
    }
    Ok(())
  }
}

/// `and`/`or` are deliberately fused into arithmetic opcodes rather
/// than lowered to short-circuiting jumps; see the design notes this
/// behavior is ported from. Preserved faithfully, not "fixed".
fn binary_opcode(op: &BinaryOp) -> Opcode {
  match op {
    BinaryOp::Add => Opcode::Add,
    BinaryOp::Sub => Opcode::Sub,
    BinaryOp::Mul => Opcode::Mul,
    BinaryOp::Div => Opcode::Div,
    BinaryOp::Mod => Opcode::Mod,
    BinaryOp::Eq => Opcode::CmpEq,
    BinaryOp::NotEq => Opcode::CmpNe,
    BinaryOp::Lt => Opcode::CmpLt,
    BinaryOp::LtEq => Opcode::CmpLe,
    BinaryOp::Gt => Opcode::CmpGt,
    BinaryOp::GtEq => Opcode::CmpGe,
    BinaryOp::And => Opcode::Mul,
    BinaryOp::Or => Opcode::Add,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn gen(src: &str) -> Program {
    let ast = syntax::parse_source(src).unwrap();
    generate(&ast).unwrap()
  }

  #[test]
  fn ends_with_single_halt() {
    let program = gen("x = 1\n");
    assert_eq!(program.instructions.last().unwrap().opcode, Opcode::Halt);
    assert_eq!(program.instructions.iter().filter(|i| i.opcode == Opcode::Halt).count(), 1);
  }

  #[test]
  fn constant_dedup_is_idempotent() {
    let program = gen("x = 1\ny = 1\n");
    assert_eq!(program.constants.len(), 1);
  }

  #[test]
  fn and_or_fuse_to_arithmetic() {
    let program = gen("x = 1 and 2\ny = 1 or 2\n");
    assert!(program.instructions.iter().any(|i| i.opcode == Opcode::Mul));
    assert!(program.instructions.iter().any(|i| i.opcode == Opcode::Add));
  }

  #[test]
  fn not_desugars_to_cmp_eq_false() {
    let program = gen("x = not True\n");
    let ops: Vec<_> = program.instructions.iter().map(|i| i.opcode).collect();
    let pos = ops.iter().position(|o| *o == Opcode::CmpEq).unwrap();
    assert_eq!(ops[pos - 1], Opcode::LoadConst);
  }

  #[test]
  fn print_leaves_no_residual_pop() {
    let program = gen("print(1)\n");
    assert!(!program.instructions.iter().any(|i| i.opcode == Opcode::Pop));
  }

  #[test]
  fn input_statement_emits_pop() {
    let program = gen("input()\n");
    assert!(program.instructions.iter().any(|i| i.opcode == Opcode::Pop));
  }

  #[test]
  fn function_def_is_rejected() {
    let ast = syntax::parse_source("def f():\n    return 1\n").unwrap();
    assert!(generate(&ast).is_err());
  }

  #[test]
  fn if_else_jumps_patched() {
    let program = gen("if x:\n    y = 1\nelse:\n    y = 2\n");
    let has_unpatched = program
      .instructions
      .iter()
      .enumerate()
      .any(|(i, instr)| matches!(instr.opcode, Opcode::Jump | Opcode::JumpIfFalse) && instr.operand as usize == i);
    assert!(!has_unpatched);
  }
}
