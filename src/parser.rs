//! Recursive-descent parser producing the program AST.
//!
//! The expression grammar is the usual precedence ladder, written here as
//! one function per level building left-leaning trees: logical operators
//! over additive over relational over multiplicative over primary. `not`
//! prefixes a whole arithmetic expression; unary minus may prefix a name or
//! a number literal but never a parenthesised expression. The parser does
//! not recover: the first syntax error aborts the compilation.

use crate::ast::{
  Assign, BinaryOp, Decl, Direction, Expr, Param, ProcDecl, Program, Stmt, Target, UnaryOp,
  VarDecl,
};
use crate::error::{CompileError, CompileResult};
use crate::scanner::{Token, TokenKind};
use crate::ty::Type;

/// Parse a scanned token stream into a `Program`.
pub fn parse(tokens: Vec<Token>) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens);
  let program = parse_program(&mut stream)?;
  stream.expect(TokenKind::Eof)?;
  Ok(program)
}

fn parse_program(stream: &mut TokenStream) -> CompileResult<Program> {
  let start = stream.expect(TokenKind::Program)?;
  let name = stream.expect(TokenKind::Identifier)?.lexeme;
  stream.expect(TokenKind::Is)?;

  let decls = parse_declarations(stream)?;
  stream.expect(TokenKind::Begin)?;
  let body = parse_statements(stream)?;
  stream.expect(TokenKind::End)?;
  stream.expect(TokenKind::Program)?;

  Ok(Program {
    name,
    decls,
    body,
    line: start.line,
  })
}

// ----- Declarations -----

fn parse_declarations(stream: &mut TokenStream) -> CompileResult<Vec<Decl>> {
  let mut decls = Vec::new();
  while stream.peek_kind() != TokenKind::Begin {
    decls.push(parse_declaration(stream)?);
    stream.expect(TokenKind::Semicolon)?;
  }
  Ok(decls)
}

fn parse_declaration(stream: &mut TokenStream) -> CompileResult<Decl> {
  let is_global = stream.eat(TokenKind::Global);
  if stream.peek_kind() == TokenKind::Procedure {
    Ok(Decl::Proc(parse_procedure_decl(stream, is_global)?))
  } else {
    Ok(Decl::Var(parse_variable_decl(stream, is_global)?))
  }
}

fn parse_procedure_decl(stream: &mut TokenStream, is_global: bool) -> CompileResult<ProcDecl> {
  let start = stream.expect(TokenKind::Procedure)?;
  let name = stream.expect(TokenKind::Identifier)?.lexeme;

  stream.expect(TokenKind::LParen)?;
  let mut params = Vec::new();
  if stream.peek_kind() != TokenKind::RParen {
    params.push(parse_parameter(stream)?);
    while stream.eat(TokenKind::Comma) {
      params.push(parse_parameter(stream)?);
    }
  }
  stream.expect(TokenKind::RParen)?;

  let decls = parse_declarations(stream)?;
  stream.expect(TokenKind::Begin)?;
  let body = parse_statements(stream)?;
  stream.expect(TokenKind::End)?;
  stream.expect(TokenKind::Procedure)?;

  Ok(ProcDecl {
    name,
    params,
    decls,
    body,
    is_global,
    sym: None,
    line: start.line,
  })
}

fn parse_parameter(stream: &mut TokenStream) -> CompileResult<Param> {
  let var = parse_variable_decl(stream, false)?;
  let direction = match stream.peek_kind() {
    TokenKind::In => {
      stream.advance();
      Direction::In
    }
    TokenKind::Out => {
      stream.advance();
      Direction::Out
    }
    _ => {
      let token = stream.peek();
      return Err(CompileError::syntax(
        token.line,
        "direction missing from parameter specification",
      ));
    }
  };
  Ok(Param { var, direction })
}

fn parse_variable_decl(stream: &mut TokenStream, is_global: bool) -> CompileResult<VarDecl> {
  let base = parse_type_mark(stream)?;
  let name_token = stream.expect(TokenKind::Identifier)?;

  let ty = if stream.eat(TokenKind::LBracket) {
    let size = stream.expect(TokenKind::Number)?;
    let len = parse_array_size(&size)?;
    stream.expect(TokenKind::RBracket)?;
    Type::array_of(base, len)
  } else {
    base
  };

  Ok(VarDecl {
    name: name_token.lexeme,
    ty,
    is_global,
    sym: None,
    line: name_token.line,
  })
}

fn parse_type_mark(stream: &mut TokenStream) -> CompileResult<Type> {
  let token = stream.advance();
  match token.kind {
    TokenKind::IntType => Ok(Type::Int),
    TokenKind::FloatType => Ok(Type::Float),
    TokenKind::BoolType => Ok(Type::Bool),
    TokenKind::StringType => Ok(Type::Str),
    got => Err(CompileError::syntax(
      token.line,
      format!("expected a type mark, got {got}"),
    )),
  }
}

fn parse_array_size(token: &Token) -> CompileResult<i64> {
  let digits: String = token.lexeme.chars().filter(|&c| c != '_').collect();
  if digits.contains('.') {
    return Err(CompileError::syntax(
      token.line,
      format!("array size must be an integer literal, got '{}'", token.lexeme),
    ));
  }
  digits.parse::<i64>().map_err(|_| {
    CompileError::lexical(
      token.line,
      format!("malformed number literal '{}'", token.lexeme),
    )
  })
}

// ----- Statements -----

fn parse_statements(stream: &mut TokenStream) -> CompileResult<Vec<Stmt>> {
  let mut statements = Vec::new();
  while !matches!(stream.peek_kind(), TokenKind::End | TokenKind::Else) {
    statements.push(parse_statement(stream)?);
    stream.expect(TokenKind::Semicolon)?;
  }
  Ok(statements)
}

fn parse_statement(stream: &mut TokenStream) -> CompileResult<Stmt> {
  match stream.peek_kind() {
    TokenKind::If => parse_if_statement(stream),
    TokenKind::For => parse_for_statement(stream),
    TokenKind::Return => {
      let token = stream.advance();
      Ok(Stmt::Return { line: token.line })
    }
    TokenKind::Identifier if stream.peek_second() == TokenKind::LParen => {
      let name = stream.advance();
      let call = parse_call(stream, name)?;
      Ok(Stmt::Call(call))
    }
    TokenKind::Identifier => Ok(Stmt::Assign(parse_assignment(stream)?)),
    got => {
      let token = stream.peek();
      Err(CompileError::syntax(
        token.line,
        format!("expected a statement, got {got}"),
      ))
    }
  }
}

fn parse_assignment(stream: &mut TokenStream) -> CompileResult<Assign> {
  let name_token = stream.expect(TokenKind::Identifier)?;
  let index = if stream.eat(TokenKind::LBracket) {
    let index = parse_expression(stream)?;
    stream.expect(TokenKind::RBracket)?;
    Some(index)
  } else {
    None
  };
  stream.expect(TokenKind::Assign)?;
  let value = parse_expression(stream)?;

  let line = name_token.line;
  Ok(Assign {
    target: Target {
      name: name_token.lexeme,
      index,
      sym: None,
      ty: None,
      line,
    },
    value,
    line,
  })
}

fn parse_if_statement(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let start = stream.expect(TokenKind::If)?;
  stream.expect(TokenKind::LParen)?;
  let cond = parse_expression(stream)?;
  stream.expect(TokenKind::RParen)?;
  stream.expect(TokenKind::Then)?;

  // At least one statement is required in each clause.
  let mut then_body = vec![parse_statement(stream)?];
  stream.expect(TokenKind::Semicolon)?;
  then_body.extend(parse_statements(stream)?);

  let else_body = if stream.eat(TokenKind::Else) {
    let mut body = vec![parse_statement(stream)?];
    stream.expect(TokenKind::Semicolon)?;
    body.extend(parse_statements(stream)?);
    body
  } else {
    Vec::new()
  };

  stream.expect(TokenKind::End)?;
  stream.expect(TokenKind::If)?;

  Ok(Stmt::If {
    cond,
    then_body,
    else_body,
    line: start.line,
  })
}

fn parse_for_statement(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let start = stream.expect(TokenKind::For)?;
  stream.expect(TokenKind::LParen)?;
  let init = parse_assignment(stream)?;
  stream.expect(TokenKind::Semicolon)?;
  let cond = parse_expression(stream)?;
  stream.expect(TokenKind::RParen)?;

  let body = parse_statements(stream)?;
  stream.expect(TokenKind::End)?;
  stream.expect(TokenKind::For)?;

  Ok(Stmt::For {
    init,
    cond,
    body,
    line: start.line,
  })
}

// ----- Expressions -----

fn parse_expression(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_logical_operand(stream)?;

  loop {
    let op = match stream.peek_kind() {
      TokenKind::And => BinaryOp::And,
      TokenKind::Or => BinaryOp::Or,
      _ => break,
    };
    let line = stream.advance().line;
    let rhs = parse_logical_operand(stream)?;
    node = Expr::binary(op, node, rhs, line);
  }

  Ok(node)
}

/// `not` applies to the whole following arithmetic expression.
fn parse_logical_operand(stream: &mut TokenStream) -> CompileResult<Expr> {
  if stream.peek_kind() == TokenKind::Not {
    let line = stream.advance().line;
    let operand = parse_arith(stream)?;
    return Ok(Expr::unary(UnaryOp::Not, operand, line));
  }
  parse_arith(stream)
}

fn parse_arith(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_relation(stream)?;

  loop {
    let op = match stream.peek_kind() {
      TokenKind::Plus => BinaryOp::Add,
      TokenKind::Minus => BinaryOp::Sub,
      _ => break,
    };
    let line = stream.advance().line;
    let rhs = parse_relation(stream)?;
    node = Expr::binary(op, node, rhs, line);
  }

  Ok(node)
}

fn parse_relation(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_term(stream)?;

  loop {
    let op = match stream.peek_kind() {
      TokenKind::Lt => BinaryOp::Lt,
      TokenKind::Le => BinaryOp::Le,
      TokenKind::Gt => BinaryOp::Gt,
      TokenKind::Ge => BinaryOp::Ge,
      TokenKind::Eq => BinaryOp::Eq,
      TokenKind::Ne => BinaryOp::Ne,
      _ => break,
    };
    let line = stream.advance().line;
    let rhs = parse_term(stream)?;
    node = Expr::binary(op, node, rhs, line);
  }

  Ok(node)
}

fn parse_term(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_factor(stream)?;

  loop {
    let op = match stream.peek_kind() {
      TokenKind::Star => BinaryOp::Mul,
      TokenKind::Slash => BinaryOp::Div,
      _ => break,
    };
    let line = stream.advance().line;
    let rhs = parse_factor(stream)?;
    node = Expr::binary(op, node, rhs, line);
  }

  Ok(node)
}

fn parse_factor(stream: &mut TokenStream) -> CompileResult<Expr> {
  let token = stream.advance();
  match token.kind {
    TokenKind::LParen => {
      let node = parse_expression(stream)?;
      stream.expect(TokenKind::RParen)?;
      Ok(node)
    }
    TokenKind::Minus => {
      let line = token.line;
      let operand = match stream.peek_kind() {
        TokenKind::Number => {
          let number = stream.advance();
          parse_number(&number)?
        }
        TokenKind::Identifier => {
          let name = stream.advance();
          parse_name(stream, name)?
        }
        got => {
          return Err(CompileError::syntax(
            stream.peek().line,
            format!("unary minus must precede a name or a number, got {got}"),
          ));
        }
      };
      Ok(Expr::unary(UnaryOp::Neg, operand, line))
    }
    TokenKind::Number => parse_number(&token),
    TokenKind::Identifier => parse_name(stream, token),
    TokenKind::StringLit => Ok(Expr::Lit {
      value: crate::ast::LitValue::Str(token.lexeme),
      ty: None,
      line: token.line,
    }),
    TokenKind::True => Ok(Expr::bool_lit(true, token.line)),
    TokenKind::False => Ok(Expr::bool_lit(false, token.line)),
    got => Err(CompileError::syntax(
      token.line,
      format!("unexpected {got} in expression"),
    )),
  }
}

/// A name in expression position: a plain reference, an array index or a
/// procedure call, depending on the following token.
fn parse_name(stream: &mut TokenStream, name: Token) -> CompileResult<Expr> {
  match stream.peek_kind() {
    TokenKind::LParen => parse_call(stream, name),
    TokenKind::LBracket => {
      stream.advance();
      let index = parse_expression(stream)?;
      stream.expect(TokenKind::RBracket)?;
      Ok(Expr::Index {
        name: name.lexeme,
        index: Box::new(index),
        sym: None,
        ty: None,
        line: name.line,
      })
    }
    _ => Ok(Expr::Ref {
      name: name.lexeme,
      sym: None,
      ty: None,
      line: name.line,
    }),
  }
}

fn parse_call(stream: &mut TokenStream, name: Token) -> CompileResult<Expr> {
  stream.expect(TokenKind::LParen)?;
  let mut args = Vec::new();
  if stream.peek_kind() != TokenKind::RParen {
    args.push(parse_expression(stream)?);
    while stream.eat(TokenKind::Comma) {
      args.push(parse_expression(stream)?);
    }
  }
  stream.expect(TokenKind::RParen)?;
  Ok(Expr::Call {
    name: name.lexeme,
    args,
    sym: None,
    ty: None,
    line: name.line,
  })
}

/// Convert a NUMBER lexeme: underscores are stripped, and the presence of a
/// decimal point decides between int and float.
fn parse_number(token: &Token) -> CompileResult<Expr> {
  let digits: String = token.lexeme.chars().filter(|&c| c != '_').collect();
  if digits.contains('.') {
    digits
      .parse::<f64>()
      .map(|value| Expr::float_lit(value, token.line))
      .map_err(|_| ())
  } else {
    digits
      .parse::<i64>()
      .map(|value| Expr::int_lit(value, token.line))
      .map_err(|_| ())
  }
  .map_err(|_| {
    CompileError::lexical(
      token.line,
      format!("malformed number literal '{}'", token.lexeme),
    )
  })
}

/// Peekable one-token-lookahead cursor over the scanned tokens.
struct TokenStream {
  tokens: Vec<Token>,
  pos: usize,
}

impl TokenStream {
  /// The scanner guarantees a trailing `Eof` token, which the cursor never
  /// moves past.
  fn new(tokens: Vec<Token>) -> Self {
    debug_assert!(matches!(
      tokens.last(),
      Some(Token {
        kind: TokenKind::Eof,
        ..
      })
    ));
    Self { tokens, pos: 0 }
  }

  fn peek(&self) -> &Token {
    &self.tokens[self.pos]
  }

  fn peek_kind(&self) -> TokenKind {
    self.peek().kind
  }

  fn peek_second(&self) -> TokenKind {
    self
      .tokens
      .get(self.pos + 1)
      .map(|t| t.kind)
      .unwrap_or(TokenKind::Eof)
  }

  fn advance(&mut self) -> Token {
    let token = self.tokens[self.pos].clone();
    if token.kind != TokenKind::Eof {
      self.pos += 1;
    }
    token
  }

  fn eat(&mut self, kind: TokenKind) -> bool {
    if self.peek_kind() == kind {
      self.pos += 1;
      return true;
    }
    false
  }

  fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
    if self.peek_kind() == kind {
      Ok(self.advance())
    } else {
      let token = self.peek();
      Err(CompileError::syntax(
        token.line,
        format!("expected {kind} at line {}, got {}", token.line, token.kind),
      ))
    }
  }
}
