//! The typed syntax tree produced by the parser.
//!
//! Every node is wrapped in `Spanned` at the point it's constructed so
//! diagnostics further down the pipeline (code generation) can still
//! point back at source text.

use span::Spanned;

#[derive(Clone, Debug, PartialEq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Eq,
  NotEq,
  Lt,
  LtEq,
  Gt,
  GtEq,
  /// `and`, fused into arithmetic at code generation time.
  And,
  /// `or`, fused into arithmetic at code generation time.
  Or,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UnaryOp {
  Neg,
  Pos,
  Not,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
  NumberLiteral(Number),
  StringLiteral(String),
  BooleanLiteral(bool),
  Identifier(String),
  BinaryOperation {
    left: Box<Spanned<Expr>>,
    op: BinaryOp,
    right: Box<Spanned<Expr>>,
  },
  UnaryOperation {
    op: UnaryOp,
    operand: Box<Spanned<Expr>>,
  },
  FunctionCall {
    name: String,
    args: Vec<Spanned<Expr>>,
  },
}

/// A numeric literal's parsed value. A dot in the source text selects
/// `Float`, its absence selects `Int`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
  Int(i64),
  Float(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
  Assignment {
    name: String,
    value: Spanned<Expr>,
  },
  ExpressionStatement(Spanned<Expr>),
  IfStatement {
    cond: Spanned<Expr>,
    then_branch: Vec<Spanned<Stmt>>,
    else_branch: Option<Vec<Spanned<Stmt>>>,
  },
  WhileStatement {
    cond: Spanned<Expr>,
    body: Vec<Spanned<Stmt>>,
  },
  FunctionDef {
    name: String,
    params: Vec<String>,
    body: Vec<Spanned<Stmt>>,
  },
  ReturnStatement(Option<Spanned<Expr>>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
  pub statements: Vec<Spanned<Stmt>>,
}
