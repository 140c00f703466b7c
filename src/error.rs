use std::fmt::Display;

use crate::bytecode::ContainerError;
use crate::emit::CodeGenError;
use crate::vm::VmError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The union of every error the compile-and-run pipeline can produce.
/// Mirrors the individual stage errors rather than flattening them, so
/// callers can still match on the originating stage.
#[derive(Debug)]
pub enum Error {
  Syntax(syntax::Error),
  CodeGen(CodeGenError),
  Container(ContainerError),
  Vm(VmError),
}

impl From<syntax::Error> for Error {
  fn from(value: syntax::Error) -> Self {
    Error::Syntax(value)
  }
}

impl From<CodeGenError> for Error {
  fn from(value: CodeGenError) -> Self {
    Error::CodeGen(value)
  }
}

impl From<ContainerError> for Error {
  fn from(value: ContainerError) -> Self {
    Error::Container(value)
  }
}

impl From<VmError> for Error {
  fn from(value: VmError) -> Self {
    Error::Vm(value)
  }
}

impl Display for Error {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Error::Syntax(e) => write!(f, "{e}"),
      Error::CodeGen(e) => write!(f, "{e}"),
      Error::Container(e) => write!(f, "{e}"),
      Error::Vm(e) => write!(f, "{e}"),
    }
  }
}

impl std::error::Error for Error {}
