use std::fmt::Display;

use span::Span;

/// Every distinct kind of lexeme the lexer can produce, including the
/// synthetic tokens (`Indent`/`Dedent`/`Newline`/`Eof`) that don't
/// correspond to literal source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
  Number,
  String,
  /// Never actually produced by the lexer: `True`/`False` lex as
  /// `Keyword`, because they're members of the keyword set. Kept in
  /// the data model for completeness.
  Boolean,
  Identifier,
  Keyword,

  Plus,
  Minus,
  Multiply,
  Divide,
  Modulo,

  Equal,
  NotEqual,
  LessThan,
  LessEqual,
  GreaterThan,
  GreaterEqual,
  Assign,

  LParen,
  RParen,
  Colon,
  Comma,

  Newline,
  Indent,
  Dedent,
  Eof,
  Error,
}

impl TokenKind {
  pub fn name(&self) -> &'static str {
    use TokenKind::*;
    match self {
      Number => "number",
      String => "string",
      Boolean => "boolean",
      Identifier => "identifier",
      Keyword => "keyword",
      Plus => "'+'",
      Minus => "'-'",
      Multiply => "'*'",
      Divide => "'/'",
      Modulo => "'%'",
      Equal => "'=='",
      NotEqual => "'!='",
      LessThan => "'<'",
      LessEqual => "'<='",
      GreaterThan => "'>'",
      GreaterEqual => "'>='",
      Assign => "'='",
      LParen => "'('",
      RParen => "')'",
      Colon => "':'",
      Comma => "','",
      Newline => "newline",
      Indent => "indent",
      Dedent => "dedent",
      Eof => "end of file",
      Error => "invalid token",
    }
  }
}

impl Display for TokenKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.name())
  }
}

/// A single lexeme together with its source position.
///
/// `line` and `column` are 1-based, matching the positions reported in
/// diagnostics. `lexeme` is the literal source text the token was
/// scanned from; for synthetic tokens (`Indent`/`Dedent`/`Eof`) it is
/// empty.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
  pub kind: TokenKind,
  pub lexeme: String,
  pub line: u32,
  pub column: u32,
  pub span: Span,
}

impl Token {
  pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32, column: u32, span: impl Into<Span>) -> Self {
    Token {
      kind,
      lexeme: lexeme.into(),
      line,
      column,
      span: span.into(),
    }
  }

  pub fn is(&self, kind: TokenKind) -> bool {
    self.kind == kind
  }

  /// True if this is a `Keyword` token whose lexeme matches `word`.
  pub fn is_keyword(&self, word: &str) -> bool {
    self.kind == TokenKind::Keyword && self.lexeme == word
  }
}

impl Display for Token {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.lexeme.is_empty() {
      write!(f, "{}", self.kind)
    } else {
      write!(f, "{} `{}`", self.kind, self.lexeme)
    }
  }
}

pub const KEYWORDS: &[&str] = &[
  "if", "else", "elif", "while", "for", "def", "return", "True", "False", "and", "or", "not", "in", "is", "class",
  "import", "from", "as", "try", "except", "finally", "with", "pass", "break", "continue",
];

pub fn is_keyword(word: &str) -> bool {
  KEYWORDS.contains(&word)
}
