//! Lexical analysis: turns the character stream into a vector of tokens.
//!
//! The scanner is a deterministic longest-match tokeniser. Two-character
//! operators are tried before their one-character prefixes, identifiers are
//! filtered through the reserved-word table, and numbers are kept as raw
//! lexemes: deciding between int and float literals is the parser's job.

use crate::error::{CompileError, CompileResult};
use crate::source::Source;

/// Kinds of tokens recognised by the front-end, one per reserved word plus
/// the punctuator, operator and literal classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  // Reserved words.
  Program,
  Is,
  Begin,
  End,
  Global,
  Procedure,
  In,
  Out,
  If,
  Then,
  Else,
  For,
  Return,
  Not,
  And,
  Or,
  True,
  False,
  IntType,
  FloatType,
  BoolType,
  StringType,
  // Punctuators.
  Assign,
  Semicolon,
  Colon,
  Comma,
  LParen,
  RParen,
  LBracket,
  RBracket,
  LBrace,
  RBrace,
  // Operators.
  Plus,
  Minus,
  Star,
  Slash,
  Eq,
  Ne,
  Lt,
  Gt,
  Le,
  Ge,
  // Literal classes.
  Number,
  StringLit,
  Identifier,
  Eof,
}

impl std::fmt::Display for TokenKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let text = match self {
      TokenKind::Program => "'program'",
      TokenKind::Is => "'is'",
      TokenKind::Begin => "'begin'",
      TokenKind::End => "'end'",
      TokenKind::Global => "'global'",
      TokenKind::Procedure => "'procedure'",
      TokenKind::In => "'in'",
      TokenKind::Out => "'out'",
      TokenKind::If => "'if'",
      TokenKind::Then => "'then'",
      TokenKind::Else => "'else'",
      TokenKind::For => "'for'",
      TokenKind::Return => "'return'",
      TokenKind::Not => "'not'",
      TokenKind::And => "'&'",
      TokenKind::Or => "'|'",
      TokenKind::True => "'true'",
      TokenKind::False => "'false'",
      TokenKind::IntType => "'int'",
      TokenKind::FloatType => "'float'",
      TokenKind::BoolType => "'bool'",
      TokenKind::StringType => "'string'",
      TokenKind::Assign => "':='",
      TokenKind::Semicolon => "';'",
      TokenKind::Colon => "':'",
      TokenKind::Comma => "','",
      TokenKind::LParen => "'('",
      TokenKind::RParen => "')'",
      TokenKind::LBracket => "'['",
      TokenKind::RBracket => "']'",
      TokenKind::LBrace => "'{'",
      TokenKind::RBrace => "'}'",
      TokenKind::Plus => "'+'",
      TokenKind::Minus => "'-'",
      TokenKind::Star => "'*'",
      TokenKind::Slash => "'/'",
      TokenKind::Eq => "'=='",
      TokenKind::Ne => "'!='",
      TokenKind::Lt => "'<'",
      TokenKind::Gt => "'>'",
      TokenKind::Le => "'<='",
      TokenKind::Ge => "'>='",
      TokenKind::Number => "number",
      TokenKind::StringLit => "string literal",
      TokenKind::Identifier => "identifier",
      TokenKind::Eof => "end of file",
    };
    f.write_str(text)
  }
}

/// Lexical information carried into the later stages: kind, raw lexeme and
/// the 1-based line the token starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
  pub kind: TokenKind,
  pub lexeme: String,
  pub line: u32,
}

impl Token {
  fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32) -> Self {
    Self {
      kind,
      lexeme: lexeme.into(),
      line,
    }
  }
}

fn keyword(word: &str) -> Option<TokenKind> {
  let kind = match word {
    "program" => TokenKind::Program,
    "is" => TokenKind::Is,
    "begin" => TokenKind::Begin,
    "end" => TokenKind::End,
    "global" => TokenKind::Global,
    "procedure" => TokenKind::Procedure,
    "in" => TokenKind::In,
    "out" => TokenKind::Out,
    "if" => TokenKind::If,
    "then" => TokenKind::Then,
    "else" => TokenKind::Else,
    "for" => TokenKind::For,
    "return" => TokenKind::Return,
    "not" => TokenKind::Not,
    "and" => TokenKind::And,
    "or" => TokenKind::Or,
    "true" => TokenKind::True,
    "false" => TokenKind::False,
    "int" => TokenKind::IntType,
    "float" => TokenKind::FloatType,
    "bool" => TokenKind::BoolType,
    "string" => TokenKind::StringType,
    _ => return None,
  };
  Some(kind)
}

fn is_legal_string_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | ',' | ';' | ':' | '.' | '\'')
}

/// Lex the whole input into a flat vector of tokens terminated by `Eof`.
pub fn scan(text: &str) -> CompileResult<Vec<Token>> {
  let mut scanner = Scanner::new(text);
  let mut tokens = Vec::new();
  loop {
    let token = scanner.next_token()?;
    let done = token.kind == TokenKind::Eof;
    tokens.push(token);
    if done {
      return Ok(tokens);
    }
  }
}

struct Scanner<'a> {
  src: Source<'a>,
  pending: Option<(char, u32)>,
}

impl<'a> Scanner<'a> {
  fn new(text: &'a str) -> Self {
    Self {
      src: Source::new(text),
      pending: None,
    }
  }

  fn get(&mut self) -> CompileResult<Option<(char, u32)>> {
    if let Some(held) = self.pending.take() {
      return Ok(Some(held));
    }
    Ok(self.src.advance()?.map(|c| (c, self.src.line())))
  }

  fn peek(&mut self) -> CompileResult<Option<char>> {
    if self.pending.is_none() {
      self.pending = self.src.advance()?.map(|c| (c, self.src.line()));
    }
    Ok(self.pending.map(|(c, _)| c))
  }

  /// Consume the next character if it matches, for two-character operators.
  fn eat(&mut self, want: char) -> CompileResult<bool> {
    if self.peek()? == Some(want) {
      self.pending = None;
      return Ok(true);
    }
    Ok(false)
  }

  fn next_token(&mut self) -> CompileResult<Token> {
    // Whitespace is a separator, never a token.
    let (c, line) = loop {
      match self.get()? {
        Some((c, _)) if c.is_ascii_whitespace() => continue,
        Some(held) => break held,
        None => return Ok(Token::new(TokenKind::Eof, "", self.src.line())),
      }
    };

    match c {
      ';' => Ok(Token::new(TokenKind::Semicolon, ";", line)),
      ',' => Ok(Token::new(TokenKind::Comma, ",", line)),
      '(' => Ok(Token::new(TokenKind::LParen, "(", line)),
      ')' => Ok(Token::new(TokenKind::RParen, ")", line)),
      '[' => Ok(Token::new(TokenKind::LBracket, "[", line)),
      ']' => Ok(Token::new(TokenKind::RBracket, "]", line)),
      '{' => Ok(Token::new(TokenKind::LBrace, "{", line)),
      '}' => Ok(Token::new(TokenKind::RBrace, "}", line)),
      '+' => Ok(Token::new(TokenKind::Plus, "+", line)),
      '-' => Ok(Token::new(TokenKind::Minus, "-", line)),
      '*' => Ok(Token::new(TokenKind::Star, "*", line)),
      '/' => Ok(Token::new(TokenKind::Slash, "/", line)),
      '&' => Ok(Token::new(TokenKind::And, "&", line)),
      '|' => Ok(Token::new(TokenKind::Or, "|", line)),
      ':' => {
        if self.eat('=')? {
          Ok(Token::new(TokenKind::Assign, ":=", line))
        } else {
          Ok(Token::new(TokenKind::Colon, ":", line))
        }
      }
      '<' => {
        if self.eat('=')? {
          Ok(Token::new(TokenKind::Le, "<=", line))
        } else {
          Ok(Token::new(TokenKind::Lt, "<", line))
        }
      }
      '>' => {
        if self.eat('=')? {
          Ok(Token::new(TokenKind::Ge, ">=", line))
        } else {
          Ok(Token::new(TokenKind::Gt, ">", line))
        }
      }
      '=' => {
        if self.eat('=')? {
          Ok(Token::new(TokenKind::Eq, "==", line))
        } else {
          Err(CompileError::lexical(line, "illegal character '='"))
        }
      }
      '!' => {
        if self.eat('=')? {
          Ok(Token::new(TokenKind::Ne, "!=", line))
        } else {
          Err(CompileError::lexical(line, "illegal character '!'"))
        }
      }
      '"' => self.string_literal(line),
      c if c.is_ascii_digit() => self.number(c, line),
      c if c.is_ascii_alphabetic() => self.identifier(c, line),
      c => Err(CompileError::lexical(
        line,
        format!("illegal character '{c}'"),
      )),
    }
  }

  fn identifier(&mut self, first: char, line: u32) -> CompileResult<Token> {
    let mut lexeme = String::new();
    lexeme.push(first);
    while let Some(c) = self.peek()? {
      if c.is_ascii_alphanumeric() || c == '_' {
        lexeme.push(c);
        self.pending = None;
      } else {
        break;
      }
    }
    let kind = keyword(&lexeme).unwrap_or(TokenKind::Identifier);
    Ok(Token::new(kind, lexeme, line))
  }

  fn number(&mut self, first: char, line: u32) -> CompileResult<Token> {
    let mut lexeme = String::new();
    lexeme.push(first);
    self.digits(&mut lexeme)?;
    if self.peek()? == Some('.') {
      lexeme.push('.');
      self.pending = None;
      self.digits(&mut lexeme)?;
    }
    Ok(Token::new(TokenKind::Number, lexeme, line))
  }

  fn digits(&mut self, lexeme: &mut String) -> CompileResult<()> {
    while let Some(c) = self.peek()? {
      if c.is_ascii_digit() || c == '_' {
        lexeme.push(c);
        self.pending = None;
      } else {
        break;
      }
    }
    Ok(())
  }

  fn string_literal(&mut self, line: u32) -> CompileResult<Token> {
    let mut lexeme = String::new();
    loop {
      match self.get()? {
        Some(('"', _)) => return Ok(Token::new(TokenKind::StringLit, lexeme, line)),
        Some(('\n', _)) | None => {
          return Err(CompileError::lexical(line, "unterminated string literal"));
        }
        Some((c, held_line)) => {
          if !is_legal_string_char(c) {
            return Err(CompileError::lexical(
              held_line,
              format!("illegal character '{c}' in string literal"),
            ));
          }
          lexeme.push(c);
        }
      }
    }
  }
}
