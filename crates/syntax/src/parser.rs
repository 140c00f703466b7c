use beef::lean::Cow;
use span::{Span, Spanned};

use crate::ast::{BinaryOp, Expr, Number, Program, Stmt, UnaryOp};
use crate::token::{Token, TokenKind};

#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
  pub message: Cow<'static, str>,
  pub span: Span,
}

impl ParseError {
  fn new(message: impl Into<Cow<'static, str>>, span: impl Into<Span>) -> Self {
    ParseError {
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

// A single expression_/statement_ call consumes a modest amount of stack;
// 64k is a generous margin for the deepest plausible nesting of
// parenthesized expressions and if/while blocks.
#[cfg(feature = "check-recursion-limit")]
const MINIMUM_STACK_REQUIRED: usize = 64_000;

#[cfg(feature = "check-recursion-limit")]
fn check_recursion_limit(span: Span) -> Result<(), ParseError> {
  if stacker::remaining_stack()
    .map(|available| available > MINIMUM_STACK_REQUIRED)
    .unwrap_or(true)
  {
    Ok(())
  } else {
    Err(ParseError::new("nesting limit reached", span))
  }
}

#[cfg(not(feature = "check-recursion-limit"))]
fn check_recursion_limit(_span: Span) -> Result<(), ParseError> {
  Ok(())
}

pub fn parse(tokens: &[Token]) -> Result<Program, ParseError> {
  let mut parser = Parser { tokens, pos: 0 };
  let mut statements = Vec::new();
  parser.skip_newlines();
  while !parser.at(TokenKind::Eof) {
    statements.push(parser.statement()?);
    parser.skip_newlines();
  }
  Ok(Program { statements })
}

struct Parser<'t> {
  tokens: &'t [Token],
  pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl<'t> Parser<'t> {
  fn current(&self) -> &Token {
    &self.tokens[self.pos.min(self.tokens.len() - 1)]
  }

  fn previous(&self) -> &Token {
    &self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
  }

  fn at(&self, kind: TokenKind) -> bool {
    self.current().kind == kind
  }

  fn at_keyword(&self, word: &str) -> bool {
    self.current().is_keyword(word)
  }

  fn advance(&mut self) -> Token {
    let tok = self.current().clone();
    if self.pos < self.tokens.len() - 1 {
      self.pos += 1;
    }
    tok
  }

  fn skip_newlines(&mut self) {
    while self.at(TokenKind::Newline) {
      self.advance();
    }
  }

  fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
    if self.at(kind) {
      Ok(self.advance())
    } else {
      let found = self.current().clone();
      Err(ParseError::new(format!("expected {kind}, found {found}"), found.span))
    }
  }

  fn expect_keyword(&mut self, word: &'static str) -> PResult<Token> {
    if self.at_keyword(word) {
      Ok(self.advance())
    } else {
      let found = self.current().clone();
      Err(ParseError::new(format!("expected '{word}', found {found}"), found.span))
    }
  }

  /// Advances until the previous token is `Newline` or the current
  /// token starts a new statement, so the caller can resume parsing
  /// after an error instead of aborting the whole parse.
  fn synchronize(&mut self) {
    while !self.at(TokenKind::Eof) {
      if self.previous().kind == TokenKind::Newline {
        return;
      }
      if ["if", "while", "def", "return"].iter().any(|k| self.at_keyword(k)) {
        return;
      }
      self.advance();
    }
  }

  fn block(&mut self) -> PResult<Vec<Spanned<Stmt>>> {
    self.expect(TokenKind::Indent)?;
    let mut statements = Vec::new();
    loop {
      self.skip_newlines();
      if self.at(TokenKind::Dedent) {
        break;
      }
      if self.at(TokenKind::Eof) {
        return Err(ParseError::new("expected dedent, found end of file", self.current().span));
      }
      match self.statement() {
        Ok(stmt) => statements.push(stmt),
        Err(e) => {
          self.synchronize();
          return Err(e);
        }
      }
    }
    self.expect(TokenKind::Dedent)?;
    Ok(statements)
  }

  fn statement(&mut self) -> PResult<Spanned<Stmt>> {
    if self.at_keyword("if") {
      return self.if_statement();
    }
    if self.at_keyword("while") {
      return self.while_statement();
    }
    if self.at_keyword("def") {
      return self.function_def();
    }
    if self.at_keyword("return") {
      return self.return_statement();
    }
    self.assignment_or_expression_statement()
  }

  fn if_statement(&mut self) -> PResult<Spanned<Stmt>> {
    let start = self.advance().span; // 'if'
    let cond = self.expression()?;
    self.expect(TokenKind::Colon)?;
    self.expect(TokenKind::Newline)?;
    let then_branch = self.block()?;
    let mut else_branch = None;
    self.skip_newlines();
    if self.at_keyword("else") {
      self.advance();
      self.expect(TokenKind::Colon)?;
      self.expect(TokenKind::Newline)?;
      else_branch = Some(self.block()?);
    }
    let end = self.previous().span;
    Ok(Spanned::new(
      start.join(end),
      Stmt::IfStatement {
        cond,
        then_branch,
        else_branch,
      },
    ))
  }

  fn while_statement(&mut self) -> PResult<Spanned<Stmt>> {
    let start = self.advance().span; // 'while'
    let cond = self.expression()?;
    self.expect(TokenKind::Colon)?;
    self.expect(TokenKind::Newline)?;
    let body = self.block()?;
    let end = self.previous().span;
    Ok(Spanned::new(start.join(end), Stmt::WhileStatement { cond, body }))
  }

  fn function_def(&mut self) -> PResult<Spanned<Stmt>> {
    let start = self.advance().span; // 'def'
    let name_tok = self.expect(TokenKind::Identifier)?;
    self.expect(TokenKind::LParen)?;
    let mut params = Vec::new();
    if !self.at(TokenKind::RParen) {
      loop {
        let p = self.expect(TokenKind::Identifier)?;
        params.push(p.lexeme);
        if self.at(TokenKind::Comma) {
          self.advance();
        } else {
          break;
        }
      }
    }
    self.expect(TokenKind::RParen)?;
    self.expect(TokenKind::Colon)?;
    self.expect(TokenKind::Newline)?;
    let body = self.block()?;
    let end = self.previous().span;
    Ok(Spanned::new(
      start.join(end),
      Stmt::FunctionDef {
        name: name_tok.lexeme,
        params,
        body,
      },
    ))
  }

  fn return_statement(&mut self) -> PResult<Spanned<Stmt>> {
    let start = self.advance().span; // 'return'
    let value = if self.at(TokenKind::Newline) || self.at(TokenKind::Eof) {
      None
    } else {
      Some(self.expression()?)
    };
    let end = self.previous().span;
    Ok(Spanned::new(start.join(end), Stmt::ReturnStatement(value)))
  }

  fn assignment_or_expression_statement(&mut self) -> PResult<Spanned<Stmt>> {
    let expr = self.expression()?;
    if self.at(TokenKind::Assign) {
      self.advance();
      let value = self.expression()?;
      let span = expr.span.join(value.span);
      return match expr.into_inner() {
        Expr::Identifier(name) => Ok(Spanned::new(span, Stmt::Assignment { name, value })),
        _ => Err(ParseError::new("assignment target must be identifier", span)),
      };
    }
    let span = expr.span;
    Ok(Spanned::new(span, Stmt::ExpressionStatement(expr)))
  }

  // --- expressions, lowest to highest precedence ---

  fn expression(&mut self) -> PResult<Spanned<Expr>> {
    check_recursion_limit(self.current().span)?;
    self.or_expr()
  }

  fn or_expr(&mut self) -> PResult<Spanned<Expr>> {
    let mut left = self.and_expr()?;
    while self.at_keyword("or") {
      self.advance();
      let right = self.and_expr()?;
      left = binary(left, BinaryOp::Or, right);
    }
    Ok(left)
  }

  fn and_expr(&mut self) -> PResult<Spanned<Expr>> {
    let mut left = self.equality_expr()?;
    while self.at_keyword("and") {
      self.advance();
      let right = self.equality_expr()?;
      left = binary(left, BinaryOp::And, right);
    }
    Ok(left)
  }

  fn equality_expr(&mut self) -> PResult<Spanned<Expr>> {
    let mut left = self.comparison_expr()?;
    loop {
      let op = match self.current().kind {
        TokenKind::Equal => BinaryOp::Eq,
        TokenKind::NotEqual => BinaryOp::NotEq,
        _ => break,
      };
      self.advance();
      let right = self.comparison_expr()?;
      left = binary(left, op, right);
    }
    Ok(left)
  }

  fn comparison_expr(&mut self) -> PResult<Spanned<Expr>> {
    let mut left = self.additive_expr()?;
    loop {
      let op = match self.current().kind {
        TokenKind::LessThan => BinaryOp::Lt,
        TokenKind::LessEqual => BinaryOp::LtEq,
        TokenKind::GreaterThan => BinaryOp::Gt,
        TokenKind::GreaterEqual => BinaryOp::GtEq,
        _ => break,
      };
      self.advance();
      let right = self.additive_expr()?;
      left = binary(left, op, right);
    }
    Ok(left)
  }

  fn additive_expr(&mut self) -> PResult<Spanned<Expr>> {
    let mut left = self.multiplicative_expr()?;
    loop {
      let op = match self.current().kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        _ => break,
      };
      self.advance();
      let right = self.multiplicative_expr()?;
      left = binary(left, op, right);
    }
    Ok(left)
  }

  fn multiplicative_expr(&mut self) -> PResult<Spanned<Expr>> {
    let mut left = self.unary_expr()?;
    loop {
      let op = match self.current().kind {
        TokenKind::Multiply => BinaryOp::Mul,
        TokenKind::Divide => BinaryOp::Div,
        TokenKind::Modulo => BinaryOp::Mod,
        _ => break,
      };
      self.advance();
      let right = self.unary_expr()?;
      left = binary(left, op, right);
    }
    Ok(left)
  }

  fn unary_expr(&mut self) -> PResult<Spanned<Expr>> {
    let op = match self.current().kind {
      TokenKind::Minus => Some(UnaryOp::Neg),
      TokenKind::Plus => Some(UnaryOp::Pos),
      _ if self.at_keyword("not") => Some(UnaryOp::Not),
      _ => None,
    };
    if let Some(op) = op {
      let start = self.advance().span;
      let operand = self.unary_expr()?;
      let span = start.join(operand.span);
      return Ok(Spanned::new(
        span,
        Expr::UnaryOperation {
          op,
          operand: Box::new(operand),
        },
      ));
    }
    self.primary_expr()
  }

  fn primary_expr(&mut self) -> PResult<Spanned<Expr>> {
    let tok = self.current().clone();
    match tok.kind {
      TokenKind::Number => {
        self.advance();
        let n = if tok.lexeme.contains('.') {
          Number::Float(tok.lexeme.parse().map_err(|_| ParseError::new("invalid number literal", tok.span))?)
        } else {
          Number::Int(tok.lexeme.parse().map_err(|_| ParseError::new("invalid number literal", tok.span))?)
        };
        Ok(Spanned::new(tok.span, Expr::NumberLiteral(n)))
      }
      TokenKind::String => {
        self.advance();
        Ok(Spanned::new(tok.span, Expr::StringLiteral(tok.lexeme)))
      }
      TokenKind::Keyword if tok.lexeme == "True" => {
        self.advance();
        Ok(Spanned::new(tok.span, Expr::BooleanLiteral(true)))
      }
      TokenKind::Keyword if tok.lexeme == "False" => {
        self.advance();
        Ok(Spanned::new(tok.span, Expr::BooleanLiteral(false)))
      }
      TokenKind::Identifier => {
        self.advance();
        if self.at(TokenKind::LParen) {
          self.advance();
          let mut args = Vec::new();
          if !self.at(TokenKind::RParen) {
            loop {
              args.push(self.expression()?);
              if self.at(TokenKind::Comma) {
                self.advance();
              } else {
                break;
              }
            }
          }
          let end = self.expect(TokenKind::RParen)?.span;
          Ok(Spanned::new(tok.span.join(end), Expr::FunctionCall { name: tok.lexeme, args }))
        } else {
          Ok(Spanned::new(tok.span, Expr::Identifier(tok.lexeme)))
        }
      }
      TokenKind::LParen => {
        self.advance();
        let inner = self.expression()?;
        let end = self.expect(TokenKind::RParen)?.span;
        Ok(Spanned::new(tok.span.join(end), inner.into_inner()))
      }
      _ => Err(ParseError::new(format!("unexpected {tok}"), tok.span)),
    }
  }
}

fn binary(left: Spanned<Expr>, op: BinaryOp, right: Spanned<Expr>) -> Spanned<Expr> {
  let span = left.span.join(right.span);
  Spanned::new(
    span,
    Expr::BinaryOperation {
      left: Box::new(left),
      op,
      right: Box::new(right),
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lexer::tokenize;

  fn parse_src(src: &str) -> Program {
    let tokens = tokenize(src).unwrap();
    parse(&tokens).unwrap()
  }

  #[test]
  fn parses_assignment() {
    let prog = parse_src("x = 1\n");
    assert_eq!(prog.statements.len(), 1);
    assert!(matches!(prog.statements[0].clone().into_inner(), Stmt::Assignment { .. }));
  }

  #[test]
  fn left_associative_additive() {
    let prog = parse_src("x = 1 - 2 - 3\n");
    let Stmt::Assignment { value, .. } = prog.statements[0].clone().into_inner() else {
      panic!()
    };
    // ((1 - 2) - 3): outer op's left operand is itself a BinaryOperation.
    let Expr::BinaryOperation { left, .. } = value.into_inner() else {
      panic!()
    };
    assert!(matches!(left.into_inner(), Expr::BinaryOperation { .. }));
  }

  #[test]
  fn if_else_block() {
    let prog = parse_src("if x:\n    y = 1\nelse:\n    y = 2\n");
    let Stmt::IfStatement { else_branch, .. } = prog.statements[0].clone().into_inner() else {
      panic!()
    };
    assert!(else_branch.is_some());
  }

  #[test]
  fn assignment_target_must_be_identifier() {
    let tokens = tokenize("1 = 2\n").unwrap();
    assert!(parse(&tokens).is_err());
  }

  #[test]
  fn function_call_parses() {
    let prog = parse_src("print(x, y)\n");
    let Stmt::ExpressionStatement(e) = prog.statements[0].clone().into_inner() else {
      panic!()
    };
    assert!(matches!(e.into_inner(), Expr::FunctionCall { .. }));
  }
}
