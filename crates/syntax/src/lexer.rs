use std::collections::VecDeque;

use beef::lean::Cow;
use span::Span;

use crate::token::{is_keyword, Token, TokenKind};

/// Error raised while scanning source text into tokens.
///
/// Carries the byte span of the offending text so callers can render a
/// source snippet via `diag`.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct LexerError {
  pub message: Cow<'static, str>,
  pub span: Span,
}

impl LexerError {
  fn new(message: impl Into<Cow<'static, str>>, span: impl Into<Span>) -> Self {
    LexerError {
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

const TAB_WIDTH: u32 = 8;

/// Scans `src` into a flat token sequence, including synthetic
/// `Indent`/`Dedent`/`Newline`/`Eof` tokens.
///
/// Tokenization is eager: the whole source is consumed up front and the
/// resulting tokens are handed to the parser as a slice. This mirrors
/// the single-pass, no-backtracking nature of the rest of the pipeline.
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexerError> {
  let mut lexer = Lexer::new(src);
  let mut tokens = Vec::new();

  loop {
    if let Some(tok) = lexer.pending.pop_front() {
      tokens.push(tok);
      continue;
    }
    if lexer.pos >= lexer.chars.len() {
      break;
    }
    if let Some(tok) = lexer.next_token()? {
      tokens.push(tok);
    }
  }

  while lexer.indent_stack.len() > 1 {
    lexer.indent_stack.pop();
    tokens.push(lexer.make_token(TokenKind::Dedent, String::new(), lexer.byte_pos(), lexer.byte_pos()));
  }
  tokens.push(lexer.make_token(TokenKind::Eof, String::new(), lexer.byte_pos(), lexer.byte_pos()));

  Ok(tokens)
}

struct Lexer<'src> {
  #[allow(dead_code)]
  src: &'src str,
  chars: Vec<char>,
  byte_offsets: Vec<usize>,
  pos: usize,
  line: u32,
  column: u32,
  at_line_start: bool,
  indent_stack: Vec<u32>,
  pending: VecDeque<Token>,
}

impl<'src> Lexer<'src> {
  fn new(src: &'src str) -> Self {
    let mut chars = Vec::new();
    let mut byte_offsets = Vec::new();
    for (i, c) in src.char_indices() {
      byte_offsets.push(i);
      chars.push(c);
    }
    byte_offsets.push(src.len());

    Lexer {
      src,
      chars,
      byte_offsets,
      pos: 0,
      line: 1,
      column: 1,
      at_line_start: true,
      indent_stack: vec![0],
      pending: VecDeque::new(),
    }
  }

  fn byte_pos(&self) -> usize {
    self.byte_offsets[self.pos]
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).copied()
  }

  fn peek_at(&self, offset: usize) -> Option<char> {
    self.chars.get(self.pos + offset).copied()
  }

  fn advance(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += 1;
    if c == '\n' {
      self.line += 1;
      self.column = 1;
    } else {
      self.column += 1;
    }
    Some(c)
  }

  fn make_token(&self, kind: TokenKind, lexeme: String, start: usize, end: usize) -> Token {
    Token::new(kind, lexeme, self.line, self.column, Span::from(start..end))
  }

  /// Handles indentation at the start of a physical line. Pushes zero
  /// or more `Indent`/`Dedent` tokens onto `pending`; never produces a
  /// token directly so that a single dedent event can emit more than
  /// one `Dedent`.
  fn handle_indentation(&mut self) -> Result<(), LexerError> {
    self.at_line_start = false;
    let start = self.byte_pos();

    let mut width = 0u32;
    loop {
      match self.peek() {
        Some(' ') => {
          width += 1;
          self.advance();
        }
        Some('\t') => {
          width += TAB_WIDTH;
          self.advance();
        }
        _ => break,
      }
    }

    // Blank line or comment-only line: no indentation change.
    match self.peek() {
      None | Some('\n') | Some('#') => return Ok(()),
      _ => {}
    }

    let top = *self.indent_stack.last().unwrap();
    if width > top {
      self.indent_stack.push(width);
      let end = self.byte_pos();
      self.pending.push_back(self.make_token(TokenKind::Indent, String::new(), start, end));
    } else if width < top {
      let end = self.byte_pos();
      while self.indent_stack.len() > 1 && *self.indent_stack.last().unwrap() > width {
        self.indent_stack.pop();
        self.pending.push_back(self.make_token(TokenKind::Dedent, String::new(), start, end));
      }
      if *self.indent_stack.last().unwrap() != width {
        return Err(LexerError::new("indentation mismatch", start..end));
      }
    }

    Ok(())
  }

  fn skip_inline_whitespace(&mut self) {
    while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
      self.advance();
    }
  }

  fn next_token(&mut self) -> Result<Option<Token>, LexerError> {
    if self.at_line_start {
      self.handle_indentation()?;
      return Ok(None);
    }

    self.skip_inline_whitespace();

    let Some(ch) = self.peek() else {
      return Ok(None);
    };

    let start = self.byte_pos();

    if ch == '#' {
      while !matches!(self.peek(), None | Some('\n')) {
        self.advance();
      }
      return Ok(None);
    }

    if ch == '\n' {
      self.advance();
      self.at_line_start = true;
      let end = self.byte_pos();
      return Ok(Some(self.make_token(TokenKind::Newline, "\n".into(), start, end)));
    }

    if ch == '"' || ch == '\'' {
      return self.scan_string(ch).map(Some);
    }

    if ch.is_ascii_digit() {
      return Ok(Some(self.scan_number()));
    }

    if ch.is_ascii_alphabetic() || ch == '_' {
      return Ok(Some(self.scan_identifier()));
    }

    let two_char = |lexer: &mut Self, second: char, two: TokenKind, one: TokenKind| {
      lexer.advance();
      if lexer.peek() == Some(second) {
        lexer.advance();
        let end = lexer.byte_pos();
        lexer.make_token(two, lexer.src[start..end].to_string(), start, end)
      } else {
        let end = lexer.byte_pos();
        lexer.make_token(one, lexer.src[start..end].to_string(), start, end)
      }
    };

    let tok = match ch {
      '=' => two_char(self, '=', TokenKind::Equal, TokenKind::Assign),
      '<' => two_char(self, '=', TokenKind::LessEqual, TokenKind::LessThan),
      '>' => two_char(self, '=', TokenKind::GreaterEqual, TokenKind::GreaterThan),
      '!' => {
        self.advance();
        if self.peek() == Some('=') {
          self.advance();
          let end = self.byte_pos();
          self.make_token(TokenKind::NotEqual, self.src[start..end].to_string(), start, end)
        } else {
          let end = self.byte_pos();
          return Err(LexerError::new("unrecognized character", start..end));
        }
      }
      '+' | '-' | '*' | '/' | '%' | '(' | ')' | ':' | ',' => {
        self.advance();
        let end = self.byte_pos();
        let kind = match ch {
          '+' => TokenKind::Plus,
          '-' => TokenKind::Minus,
          '*' => TokenKind::Multiply,
          '/' => TokenKind::Divide,
          '%' => TokenKind::Modulo,
          '(' => TokenKind::LParen,
          ')' => TokenKind::RParen,
          ':' => TokenKind::Colon,
          ',' => TokenKind::Comma,
          _ => unreachable!(),
        };
        self.make_token(kind, self.src[start..end].to_string(), start, end)
      }
      _ => {
        self.advance();
        let end = self.byte_pos();
        return Err(LexerError::new("unrecognized character", start..end));
      }
    };

    Ok(Some(tok))
  }

  fn scan_string(&mut self, quote: char) -> Result<Token, LexerError> {
    let start = self.byte_pos();
    self.advance(); // opening quote
    let mut value = String::new();
    loop {
      match self.peek() {
        None => {
          let end = self.byte_pos();
          return Err(LexerError::new("unterminated string", start..end));
        }
        Some(c) if c == quote => {
          self.advance();
          break;
        }
        Some('\n') => {
          let end = self.byte_pos();
          return Err(LexerError::new("unterminated string", start..end));
        }
        Some('\\') => {
          self.advance();
          match self.peek() {
            Some('n') => {
              value.push('\n');
              self.advance();
            }
            Some('t') => {
              value.push('\t');
              self.advance();
            }
            Some('r') => {
              value.push('\r');
              self.advance();
            }
            Some('\\') => {
              value.push('\\');
              self.advance();
            }
            Some(c) if c == quote => {
              value.push(c);
              self.advance();
            }
            Some(c) => {
              value.push(c);
              self.advance();
            }
            None => {
              let end = self.byte_pos();
              return Err(LexerError::new("unterminated string", start..end));
            }
          }
        }
        Some(c) => {
          value.push(c);
          self.advance();
        }
      }
    }
    let end = self.byte_pos();
    Ok(self.make_token(TokenKind::String, value, start, end))
  }

  fn scan_number(&mut self) -> Token {
    let start = self.byte_pos();
    let mut saw_dot = false;
    while let Some(c) = self.peek() {
      if c.is_ascii_digit() {
        self.advance();
      } else if c == '.' && !saw_dot && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit()) {
        saw_dot = true;
        self.advance();
      } else {
        break;
      }
    }
    let end = self.byte_pos();
    self.make_token(TokenKind::Number, self.src[start..end].to_string(), start, end)
  }

  fn scan_identifier(&mut self) -> Token {
    let start = self.byte_pos();
    while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
      self.advance();
    }
    let end = self.byte_pos();
    let text = self.src[start..end].to_string();
    let kind = if is_keyword(&text) { TokenKind::Keyword } else { TokenKind::Identifier };
    self.make_token(kind, text, start, end)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(src: &str) -> Vec<TokenKind> {
    tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
  }

  #[test]
  fn simple_assignment() {
    use TokenKind::*;
    assert_eq!(kinds("x = 1\n"), vec![Identifier, Assign, Number, Newline, Eof]);
  }

  #[test]
  fn indentation_basic_block() {
    use TokenKind::*;
    let src = "if x:\n    y = 1\nz = 2\n";
    assert_eq!(
      kinds(src),
      vec![
        Keyword, Identifier, Colon, Newline, Indent, Identifier, Assign, Number, Newline, Dedent, Identifier, Assign,
        Number, Newline, Eof,
      ]
    );
  }

  #[test]
  fn multi_level_dedent_emits_one_per_pop() {
    use TokenKind::*;
    let src = "if a:\n    if b:\n        x = 1\ny = 2\n";
    let ks = kinds(src);
    // two DEDENT tokens in a row before the trailing statement.
    let dedent_run = ks.windows(2).filter(|w| w[0] == Dedent && w[1] == Dedent).count();
    assert_eq!(dedent_run, 1);
  }

  #[test]
  fn blank_and_comment_lines_do_not_affect_indentation() {
    use TokenKind::*;
    let src = "if a:\n    x = 1\n\n    # comment\n    y = 2\nz = 3\n";
    let ks = kinds(src);
    assert_eq!(ks.iter().filter(|k| **k == Indent).count(), 1);
    assert_eq!(ks.iter().filter(|k| **k == Dedent).count(), 1);
  }

  #[test]
  fn tab_counts_as_eight_spaces() {
    use TokenKind::*;
    let src = "if a:\n\tx = 1\n        y = 2\n";
    // one tab (8) then 8 spaces: same indentation level, no second INDENT.
    let ks = kinds(src);
    assert_eq!(ks.iter().filter(|k| **k == Indent).count(), 1);
  }

  #[test]
  fn unterminated_string_errors() {
    assert!(tokenize("x = \"abc\n").is_err());
  }

  #[test]
  fn indentation_mismatch_errors() {
    let src = "if a:\n    x = 1\n   y = 2\n";
    assert!(tokenize(src).is_err());
  }

  #[test]
  fn keyword_vs_identifier() {
    use TokenKind::*;
    let toks = tokenize("True\nfoo\n").unwrap();
    assert_eq!(toks[0].kind, Keyword);
    assert_eq!(toks[2].kind, Identifier);
  }

  #[test]
  fn operators_prefer_two_char_forms() {
    use TokenKind::*;
    assert_eq!(kinds("a == b\n")[1], Equal);
    assert_eq!(kinds("a != b\n")[1], NotEqual);
    assert_eq!(kinds("a <= b\n")[1], LessEqual);
    assert_eq!(kinds("a >= b\n")[1], GreaterEqual);
  }

  #[test]
  fn string_escapes() {
    let toks = tokenize("\"a\\nb\"\n").unwrap();
    assert_eq!(toks[0].lexeme, "a\nb");
  }
}
