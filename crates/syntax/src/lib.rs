//! Lexer, AST, and parser for the pymv language.
//!
//! This crate only produces a typed syntax tree; it has no notion of
//! bytecode, constants, or execution. Those live in the root crate's
//! `emit` and `vm` modules.

pub mod ast;
mod lexer;
mod parser;
mod token;

pub use lexer::{tokenize, LexerError};
pub use parser::{parse, ParseError};
pub use token::{Token, TokenKind};

/// Runs the lexer then the parser, returning the first error either
/// stage produces.
pub fn parse_source(src: &str) -> Result<ast::Program, Error> {
  let tokens = tokenize(src)?;
  let program = parse(&tokens)?;
  Ok(program)
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
  #[error(transparent)]
  Lexer(#[from] LexerError),
  #[error(transparent)]
  Parser(#[from] ParseError),
}

impl Error {
  pub fn report<'a>(&self, source: impl Into<diag::Source<'a>>) -> String {
    match self {
      Error::Lexer(e) => e.report(source),
      Error::Parser(e) => e.report(source),
    }
  }
}
