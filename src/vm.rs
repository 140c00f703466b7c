//! The stack-based interpreter: fetch-decode-dispatch loop over a flat
//! instruction vector, an operand stack, a call-frame stack, and a
//! sparse variable slot table.

use std::collections::HashMap;
use std::fmt::Display;
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use crate::bytecode::{Constant, Instruction, Opcode, Program};

const MAX_STACK_DEPTH: usize = 1000;
const MAX_CALL_DEPTH: usize = 1000;

/// A runtime value carried on the operand stack.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  Int(i64),
  Float(f64),
  Str(String),
  Bool(bool),
}

impl Value {
  pub fn is_truthy(&self) -> bool {
    match self {
      Value::Int(v) => *v != 0,
      Value::Float(v) => *v != 0.0,
      Value::Str(v) => !v.is_empty(),
      Value::Bool(v) => *v,
    }
  }

  fn from_constant(c: &Constant) -> Value {
    match c {
      Constant::Int(v) => Value::Int(*v),
      Constant::Float(v) => Value::Float(*v),
      Constant::Str(v) => Value::Str(v.clone()),
      Constant::Bool(v) => Value::Bool(*v),
    }
  }
}

impl Display for Value {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Value::Int(v) => write!(f, "{v}"),
      Value::Float(v) => write!(f, "{v}"),
      Value::Str(v) => write!(f, "{v}"),
      Value::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
    }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum VmError {
  #[error("unknown opcode")]
  UnknownOpcode,
  #[error("stack underflow")]
  StackUnderflow,
  #[error("stack overflow")]
  StackOverflow,
  #[error("recursion limit")]
  RecursionLimit,
  #[error("undefined variable")]
  UndefinedVariable,
  #[error("type mismatch in arithmetic")]
  TypeMismatch,
  #[error("constant index out of range")]
  ConstantOutOfRange,
  #[error("variable index out of range")]
  VariableOutOfRange,
  #[error("division by zero")]
  DivisionByZero,
}

struct CallFrame {
  return_pc: i64,
}

/// Per-opcode execution counts and wall-clock time, kept purely for
/// observability (the `--performance` flag); never read by dispatch.
#[derive(Default, Debug, Clone)]
pub struct Stats {
  pub instructions_executed: u64,
  pub opcode_counts: HashMap<&'static str, u64>,
  pub elapsed: Duration,
}

impl Stats {
  pub fn report(&self) -> String {
    let mut out = format!(
      "executed {} instructions in {:.6}s\n",
      self.instructions_executed,
      self.elapsed.as_secs_f64()
    );
    let mut entries: Vec<_> = self.opcode_counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (name, count) in entries {
      let pct = if self.instructions_executed > 0 {
        *count as f64 / self.instructions_executed as f64 * 100.0
      } else {
        0.0
      };
      out.push_str(&format!("  {name:<14} {count:>8}  {pct:>6.2}%\n"));
    }
    out
  }
}

/// A stack-based virtual machine executing a single loaded [`Program`].
pub struct Interpreter<'p> {
  program: &'p Program,
  pc: i64,
  stack: Vec<Value>,
  vars: HashMap<u32, Value>,
  call_stack: Vec<CallFrame>,
  running: bool,
  pub stats: Stats,
  pub debug: bool,
}

impl<'p> Interpreter<'p> {
  pub fn new(program: &'p Program) -> Self {
    Interpreter {
      program,
      pc: 0,
      stack: Vec::new(),
      vars: HashMap::new(),
      call_stack: Vec::new(),
      running: true,
      stats: Stats::default(),
      debug: false,
    }
  }

  /// Runs the program to completion, writing `print`/`input` traffic
  /// through `stdout`/`stdin`. Returns `Ok(())` if the program ran to
  /// a `HALT` or an empty `RETURN`; a fatal `VmError` is already
  /// reported to `stderr` by the time it's returned, matching the
  /// design's "print diagnostic, let the caller decide whether to
  /// exit" contract.
  pub fn run(&mut self, stdout: &mut impl Write, stdin: &mut impl BufRead) -> Result<(), VmError> {
    let start = Instant::now();
    let result = self.run_loop(stdout, stdin);
    self.stats.elapsed = start.elapsed();
    if let Err(ref e) = result {
      self.report_fatal(e);
    }
    result
  }

  fn run_loop(&mut self, stdout: &mut impl Write, stdin: &mut impl BufRead) -> Result<(), VmError> {
    while self.running && self.pc >= 0 && (self.pc as usize) < self.program.instructions.len() {
      let instr = self.program.instructions[self.pc as usize];
      if self.debug {
        eprintln!("[pc={:04}] {} (stack={:?})", self.pc, instr.opcode.mnemonic(), self.stack);
      }
      self.stats.instructions_executed += 1;
      *self.stats.opcode_counts.entry(instr.opcode.mnemonic()).or_insert(0) += 1;
      self.dispatch(instr, stdout, stdin)?;
      self.pc += 1;
    }
    Ok(())
  }

  fn push(&mut self, value: Value) -> Result<(), VmError> {
    if self.stack.len() >= MAX_STACK_DEPTH {
      return Err(VmError::StackOverflow);
    }
    self.stack.push(value);
    Ok(())
  }

  fn pop(&mut self) -> Result<Value, VmError> {
    self.stack.pop().ok_or(VmError::StackUnderflow)
  }

  fn dispatch(&mut self, instr: Instruction, stdout: &mut impl Write, stdin: &mut impl BufRead) -> Result<(), VmError> {
    use Opcode::*;
    match instr.opcode {
      Nop => {}
      LoadConst => {
        let c = self
          .program
          .constants
          .get(instr.operand as usize)
          .ok_or(VmError::ConstantOutOfRange)?;
        let v = Value::from_constant(c);
        self.push(v)?;
      }
      LoadVar => {
        let v = self.vars.get(&(instr.operand as u32)).cloned().ok_or(VmError::UndefinedVariable)?;
        self.push(v)?;
      }
      StoreVar => {
        let v = self.pop()?;
        self.vars.insert(instr.operand as u32, v);
      }
      Pop => {
        self.pop()?;
      }
      Dup => {
        let v = self.pop()?;
        self.push(v.clone())?;
        self.push(v)?;
      }
      Add => self.binary_op(|a, b| arith_add(a, b))?,
      Sub => self.binary_op(|a, b| arith_numeric(a, b, |x, y| x - y, |x, y| x - y))?,
      Mul => self.binary_op(|a, b| arith_numeric(a, b, |x, y| x * y, |x, y| x * y))?,
      Div => self.binary_op(arith_div)?,
      Mod => self.binary_op(arith_mod)?,
      Neg => {
        let v = self.pop()?;
        let r = match v {
          Value::Int(v) => Value::Int(-v),
          Value::Float(v) => Value::Float(-v),
          _ => return Err(VmError::TypeMismatch),
        };
        self.push(r)?;
      }
      CmpEq => self.compare_eq()?,
      CmpNe => self.compare_ne()?,
      CmpLt => self.compare(|o| o == std::cmp::Ordering::Less, Value::ord_values)?,
      CmpLe => self.compare(|o| o != std::cmp::Ordering::Greater, Value::ord_values)?,
      CmpGt => self.compare(|o| o == std::cmp::Ordering::Greater, Value::ord_values)?,
      CmpGe => self.compare(|o| o != std::cmp::Ordering::Less, Value::ord_values)?,
      Jump => self.pc = instr.operand as i64 - 1,
      JumpIfFalse => {
        let v = self.pop()?;
        if !v.is_truthy() {
          self.pc = instr.operand as i64 - 1;
        }
      }
      JumpIfTrue => {
        let v = self.pop()?;
        if v.is_truthy() {
          self.pc = instr.operand as i64 - 1;
        }
      }
      Call => {
        if self.call_stack.len() >= MAX_CALL_DEPTH {
          return Err(VmError::RecursionLimit);
        }
        self.call_stack.push(CallFrame { return_pc: self.pc + 1 });
        self.pc = instr.operand as i64 - 1;
      }
      Return => match self.call_stack.pop() {
        None => self.running = false,
        Some(frame) => self.pc = frame.return_pc - 1,
      },
      Print => {
        let v = self.pop()?;
        writeln!(stdout, "{v}").ok();
      }
      Input => {
        let mut line = String::new();
        stdin.read_line(&mut line).ok();
        let line = line.trim_end_matches(['\n', '\r']);
        let v = if let Ok(i) = line.parse::<i64>() {
          Value::Int(i)
        } else if let Ok(f) = line.parse::<f64>() {
          Value::Float(f)
        } else {
          Value::Str(line.to_string())
        };
        self.push(v)?;
      }
      Halt => self.running = false,
    }
    Ok(())
  }

  fn binary_op(&mut self, f: impl Fn(Value, Value) -> Result<Value, VmError>) -> Result<(), VmError> {
    let b = self.pop()?;
    let a = self.pop()?;
    let r = f(a, b)?;
    self.push(r)
  }

  fn compare(&mut self, pred: impl Fn(std::cmp::Ordering) -> bool, ord: impl Fn(&Value, &Value) -> Option<std::cmp::Ordering>) -> Result<(), VmError> {
    let b = self.pop()?;
    let a = self.pop()?;
    let o = ord(&a, &b).ok_or(VmError::TypeMismatch)?;
    self.push(Value::Bool(pred(o)))
  }

  fn compare_eq(&mut self) -> Result<(), VmError> {
    let b = self.pop()?;
    let a = self.pop()?;
    self.push(Value::Bool(Value::eq_values(&a, &b)))
  }

  fn compare_ne(&mut self) -> Result<(), VmError> {
    let b = self.pop()?;
    let a = self.pop()?;
    self.push(Value::Bool(!Value::eq_values(&a, &b)))
  }

  fn report_fatal(&self, err: &VmError) {
    eprintln!("runtime error: {err}");
    eprintln!("pc={} instruction={:?}", self.pc, self.program.instructions.get(self.pc.max(0) as usize));
    eprintln!("operand stack: {:?}", self.stack);
    eprintln!(
      "call stack: {:?}",
      self.call_stack.iter().map(|f| f.return_pc).collect::<Vec<_>>()
    );
  }
}

impl Value {
  fn eq_values(a: &Value, b: &Value) -> bool {
    match (a, b) {
      (Value::Int(a), Value::Int(b)) => a == b,
      (Value::Float(a), Value::Float(b)) => a == b,
      (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
      (Value::Str(a), Value::Str(b)) => a == b,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      _ => false,
    }
  }

  fn ord_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
      (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
      (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
      (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
      (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
      (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
      (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
      _ => None,
    }
  }
}

fn arith_add(a: Value, b: Value) -> Result<Value, VmError> {
  match (a, b) {
    (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
    (a, b) => arith_numeric(a, b, |x, y| x + y, |x, y| x + y),
  }
}

/// int⊕int→int, (int,float) or (float,int)→float, per the widening
/// rules; `int_op`/`float_op` are the same operator specialized to
/// each representation.
fn arith_numeric(a: Value, b: Value, int_op: impl Fn(i64, i64) -> i64, float_op: impl Fn(f64, f64) -> f64) -> Result<Value, VmError> {
  match (a, b) {
    (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(a, b))),
    (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(a, b))),
    (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(a as f64, b))),
    (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(a, b as f64))),
    _ => Err(VmError::TypeMismatch),
  }
}

/// `/` always yields a float, regardless of operand types (see the
/// design notes on division semantics).
fn arith_div(a: Value, b: Value) -> Result<Value, VmError> {
  let (a, b) = (as_f64(&a)?, as_f64(&b)?);
  if b == 0.0 {
    return Err(VmError::DivisionByZero);
  }
  Ok(Value::Float(a / b))
}

/// `%` over floats follows IEEE remainder (Rust's `%` on `f64` already
/// matches `fmod`, i.e. truncated-division remainder). `%` over ints
/// floors like Python's `%` (sign follows the divisor), not Rust's
/// native `%` (sign follows the dividend) — ported from the source
/// interpreter's `lambda a, b: a % b`.
fn arith_mod(a: Value, b: Value) -> Result<Value, VmError> {
  match (a, b) {
    (Value::Int(a), Value::Int(b)) => {
      if b == 0 {
        return Err(VmError::DivisionByZero);
      }
      Ok(Value::Int(((a % b) + b) % b))
    }
    (a, b) => arith_numeric(a, b, |x, y| x % y, |x, y| x % y),
  }
}

fn as_f64(v: &Value) -> Result<f64, VmError> {
  match v {
    Value::Int(v) => Ok(*v as f64),
    Value::Float(v) => Ok(*v),
    _ => Err(VmError::TypeMismatch),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  fn run_src(src: &str) -> String {
    let ast = syntax::parse_source(src).unwrap();
    let program = crate::emit::generate(&ast).unwrap();
    let mut out = Vec::new();
    let mut stdin = Cursor::new(Vec::new());
    let mut vm = Interpreter::new(&program);
    vm.run(&mut out, &mut stdin).unwrap();
    String::from_utf8(out).unwrap()
  }

  #[test]
  fn integer_arithmetic() {
    let out = run_src("x = 10\ny = 3\nprint(x + y)\nprint(x - y)\nprint(x * y)\n");
    assert_eq!(out, "13\n7\n30\n");
  }

  #[test]
  fn while_loop_and_branching() {
    let out = run_src("i = 0\nwhile i < 3:\n    print(i)\n    i = i + 1\n");
    assert_eq!(out, "0\n1\n2\n");
  }

  #[test]
  fn nested_if() {
    let src = "score = 85\nif score >= 90:\n    print(\"A\")\nelse:\n    if score >= 80:\n        print(\"B\")\n    else:\n        print(\"C\")\n";
    assert_eq!(run_src(src), "B\n");
  }

  #[test]
  fn factorial_of_five() {
    let src = "n = 5\nf = 1\ni = 1\nwhile i <= n:\n    f = f * i\n    i = i + 1\nprint(f)\n";
    assert_eq!(run_src(src), "120\n");
  }

  #[test]
  fn euclidean_gcd() {
    let src = "x = 48\ny = 18\nwhile y != 0:\n    t = y\n    y = x % y\n    x = t\nprint(x)\n";
    assert_eq!(run_src(src), "6\n");
  }

  #[test]
  fn division_always_yields_float() {
    let out = run_src("print(5 / 2)\n");
    assert_eq!(out, "2.5\n");
  }

  #[test]
  fn int_modulo_floors_like_python() {
    let out = run_src("print(-7 % 3)\n");
    assert_eq!(out, "2\n");
  }

  #[test]
  fn undefined_variable_is_fatal() {
    let ast = syntax::parse_source("print(x)\n").unwrap();
    let program = crate::emit::generate(&ast).unwrap();
    let mut out = Vec::new();
    let mut stdin = Cursor::new(Vec::new());
    let mut vm = Interpreter::new(&program);
    assert!(matches!(vm.run(&mut out, &mut stdin), Err(VmError::UndefinedVariable)));
  }
}
