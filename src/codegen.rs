//! Code generation: lower the typed tree into a single C translation unit.
//!
//! Every computed value lands in a freshly named temporary (`_t0`, `_t1`,
//! ...; the counter resets at each function entry), so statements lower to
//! straight-line C with no nested expressions to worry about. Broadcast
//! operations become loops over the declared array length. Procedures are
//! lifted to top-level C functions with forward declarations up front, so
//! nesting and declaration order never matter to the C compiler; `out`
//! parameters travel as pointers. The output is deterministic for a given
//! input tree.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::ast::{
  Assign, BinaryOp, Decl, Direction, Expr, LitValue, ProcDecl, Program, Stmt, Target, UnaryOp,
};
use crate::symtab::{SymbolId, SymbolKind, SymbolTable};
use crate::ty::Type;

/// Fixed buffer length for string variables, matching the runtime contract.
const STRING_BYTES: i64 = 256;

pub fn generate(program: &Program, symbols: &SymbolTable, verbose: bool) -> String {
  let mut emitter = CodeGen {
    symbols,
    verbose,
    out: String::new(),
    indent: 0,
    temp: 0,
    index_temp: 0,
    names: HashMap::new(),
    taken: c_reserved_names(),
  };
  emitter.emit_unit(program);
  debug!("emitted {} lines of C", emitter.out.lines().count());
  emitter.out
}

struct CodeGen<'a> {
  symbols: &'a SymbolTable,
  verbose: bool,
  out: String,
  indent: usize,
  temp: usize,
  index_temp: usize,
  /// How each resolved symbol is spelled in the emitted C. Out scalar
  /// parameters are spelled `(*name)` so reads and writes go through the
  /// pointer uniformly.
  names: HashMap<SymbolId, String>,
  /// Top-level C identifiers already spoken for.
  taken: HashSet<String>,
}

fn c_reserved_names() -> HashSet<String> {
  let mut taken = HashSet::new();
  for name in [
    "main",
    "validateBooleanOp",
    "getBool",
    "getInteger",
    "getFloat",
    "getString",
    "putBool",
    "putInteger",
    "putFloat",
    "putString",
    "strcmp",
    "strcpy",
  ] {
    taken.insert(name.to_string());
  }
  taken
}

fn is_c_keyword(name: &str) -> bool {
  matches!(
    name,
    "auto"
      | "break"
      | "case"
      | "char"
      | "const"
      | "continue"
      | "default"
      | "do"
      | "double"
      | "else"
      | "enum"
      | "extern"
      | "float"
      | "for"
      | "goto"
      | "if"
      | "inline"
      | "int"
      | "long"
      | "register"
      | "restrict"
      | "return"
      | "short"
      | "signed"
      | "sizeof"
      | "static"
      | "struct"
      | "switch"
      | "typedef"
      | "union"
      | "unsigned"
      | "void"
      | "volatile"
      | "while"
  )
}

impl CodeGen<'_> {
  // ----- Translation unit layout -----

  fn emit_unit(&mut self, program: &Program) {
    self.line("#include \"runtime.h\"");
    self.line("#include <string.h>");
    self.blank();

    let procs = collect_procs(&program.decls);
    for proc in &procs {
      self.assign_proc_name(proc);
    }

    for proc in &procs {
      let signature = self.proc_signature(proc);
      self.line(&format!("{signature};"));
    }
    if !procs.is_empty() {
      self.blank();
    }

    for decl in &program.decls {
      if let Decl::Var(var) = decl
        && var.is_global
      {
        let sym = var.sym.expect("declarations are resolved before lowering");
        let name = self.assign_var_name(sym, &var.name);
        let decl_text = declare_var(&name, &var.ty, false);
        self.line(&format!("{decl_text};"));
      }
    }
    self.blank();

    for proc in &procs {
      self.emit_proc(proc);
      self.blank();
    }

    self.emit_main(program);
  }

  fn emit_main(&mut self, program: &Program) {
    self.temp = 0;
    self.index_temp = 0;
    self.line("int main() {");
    self.indent += 1;
    for decl in &program.decls {
      if let Decl::Var(var) = decl
        && !var.is_global
      {
        let sym = var.sym.expect("declarations are resolved before lowering");
        let name = self.assign_local_name(sym, &var.name);
        let decl_text = declare_var(&name, &var.ty, true);
        self.line(&format!("{decl_text};"));
      }
    }
    self.emit_stmts(&program.body, true);
    self.line("return 0;");
    self.indent -= 1;
    self.line("}");
  }

  fn emit_proc(&mut self, proc: &ProcDecl) {
    self.temp = 0;
    self.index_temp = 0;

    for param in &proc.params {
      let sym = param.var.sym.expect("parameters are resolved before lowering");
      let base = c_ident(&param.var.name);
      let spelled = if param.direction == Direction::Out && param.var.ty.is_scalar()
        && param.var.ty != Type::Str
      {
        format!("(*{base})")
      } else {
        base
      };
      self.names.insert(sym, spelled);
    }

    let signature = self.proc_signature(proc);
    self.line(&format!("{signature} {{"));
    self.indent += 1;
    for decl in &proc.decls {
      if let Decl::Var(var) = decl {
        let sym = var.sym.expect("declarations are resolved before lowering");
        let name = self.assign_local_name(sym, &var.name);
        let decl_text = declare_var(&name, &var.ty, true);
        self.line(&format!("{decl_text};"));
      }
    }
    self.emit_stmts(&proc.body, false);
    self.indent -= 1;
    self.line("}");
  }

  fn proc_signature(&self, proc: &ProcDecl) -> String {
    let name = self
      .names
      .get(&proc.sym.expect("procedures are resolved before lowering"))
      .expect("procedure names are assigned before emission");
    let params: Vec<String> = proc
      .params
      .iter()
      .map(|param| param_decl(&c_ident(&param.var.name), &param.var.ty, param.direction))
      .collect();
    format!("void {name}({})", params.join(", "))
  }

  fn assign_proc_name(&mut self, proc: &ProcDecl) {
    let sym = proc.sym.expect("procedures are resolved before lowering");
    let name = self.unique_top_level(&proc.name);
    self.names.insert(sym, name);
  }

  fn assign_var_name(&mut self, sym: SymbolId, name: &str) -> String {
    let unique = self.unique_top_level(name);
    self.names.insert(sym, unique.clone());
    unique
  }

  fn assign_local_name(&mut self, sym: SymbolId, name: &str) -> String {
    let spelled = c_ident(name);
    self.names.insert(sym, spelled.clone());
    spelled
  }

  fn unique_top_level(&mut self, name: &str) -> String {
    let base = c_ident(name);
    let mut candidate = base.clone();
    let mut suffix = 2;
    while self.taken.contains(&candidate) {
      candidate = format!("{base}_{suffix}");
      suffix += 1;
    }
    self.taken.insert(candidate.clone());
    candidate
  }

  // ----- Statements -----

  fn emit_stmts(&mut self, stmts: &[Stmt], in_main: bool) {
    for stmt in stmts {
      self.emit_stmt(stmt, in_main);
    }
  }

  fn emit_stmt(&mut self, stmt: &Stmt, in_main: bool) {
    if self.verbose {
      let line = stmt_line(stmt);
      self.line(&format!("/* line {line} */"));
    }
    match stmt {
      Stmt::Assign(assign) => self.emit_assign(assign),
      Stmt::If {
        cond,
        then_body,
        else_body,
        ..
      } => {
        let cond_op = self.emit_expr(cond);
        self.line(&format!("if ({cond_op}) {{"));
        self.indent += 1;
        self.emit_stmts(then_body, in_main);
        self.indent -= 1;
        if else_body.is_empty() {
          self.line("}");
        } else {
          self.line("} else {");
          self.indent += 1;
          self.emit_stmts(else_body, in_main);
          self.indent -= 1;
          self.line("}");
        }
      }
      Stmt::For {
        init, cond, body, ..
      } => {
        self.emit_assign(init);
        self.line("for (;;) {");
        self.indent += 1;
        let cond_op = self.emit_expr(cond);
        self.line(&format!("if (!({cond_op})) break;"));
        self.emit_stmts(body, in_main);
        self.indent -= 1;
        self.line("}");
      }
      Stmt::Return { .. } => {
        if in_main {
          self.line("return 0;");
        } else {
          self.line("return;");
        }
      }
      Stmt::Call(call) => {
        self.emit_call_statement(call);
      }
    }
  }

  fn emit_assign(&mut self, assign: &Assign) {
    let value_ty = assign
      .value
      .ty()
      .expect("assignments are typed before lowering")
      .clone();
    let value_op = self.emit_expr(&assign.value);
    let lvalue = self.target_lvalue(&assign.target);

    match &value_ty {
      Type::Str => self.line(&format!("strcpy({lvalue}, {value_op});")),
      Type::Array(elem, len) => {
        let idx = self.fresh_index();
        self.line(&format!("for (int {idx} = 0; {idx} < {len}; {idx}++) {{"));
        self.indent += 1;
        if **elem == Type::Str {
          self.line(&format!("strcpy({lvalue}[{idx}], {value_op}[{idx}]);"));
        } else {
          self.line(&format!("{lvalue}[{idx}] = {value_op}[{idx}];"));
        }
        self.indent -= 1;
        self.line("}");
      }
      _ => self.line(&format!("{lvalue} = {value_op};")),
    }
  }

  fn target_lvalue(&mut self, target: &Target) -> String {
    let base = self
      .names
      .get(&target.sym.expect("targets are resolved before lowering"))
      .expect("every resolved symbol has a C spelling")
      .clone();
    match &target.index {
      Some(index) => {
        let index_op = self.emit_expr(index);
        format!("{base}[{index_op}]")
      }
      None => base,
    }
  }

  // ----- Expressions -----

  /// Lower an expression, appending the statements that compute it, and
  /// return the C operand that names its value.
  fn emit_expr(&mut self, expr: &Expr) -> String {
    match expr {
      Expr::Lit { value, .. } => literal_operand(value),
      Expr::Ref { sym, .. } => self
        .names
        .get(&sym.expect("references are resolved before lowering"))
        .expect("every resolved symbol has a C spelling")
        .clone(),
      Expr::Index { sym, index, .. } => {
        let base = self
          .names
          .get(&sym.expect("references are resolved before lowering"))
          .expect("every resolved symbol has a C spelling")
          .clone();
        let index_op = self.emit_expr(index);
        format!("{base}[{index_op}]")
      }
      Expr::Unary { op, operand, ty, .. } => {
        let operand_op = self.emit_expr(operand);
        let result_ty = ty.as_ref().expect("expressions are typed before lowering");
        let c_op = match (op, result_ty) {
          (UnaryOp::Neg, _) => "-",
          (UnaryOp::Not, Type::Bool) => "!",
          (UnaryOp::Not, _) => "~",
        };
        let temp = self.fresh_temp();
        self.line(&format!(
          "{} {temp} = {c_op}{operand_op};",
          scalar_c_type(result_ty)
        ));
        temp
      }
      Expr::Cast {
        operand, from, to, ..
      } => {
        if from.is_array() || to.is_array() {
          unreachable!("array casts only occur under broadcast operators");
        }
        let operand_op = self.emit_expr(operand);
        match (from, to) {
          // A bool already is its int value.
          (Type::Bool, Type::Int) => operand_op,
          (Type::Int, Type::Bool) => {
            let temp = self.fresh_temp();
            self.line(&format!("int {temp} = ({operand_op} != 0);"));
            temp
          }
          (Type::Int, Type::Float) => {
            let temp = self.fresh_temp();
            self.line(&format!("float {temp} = (float){operand_op};"));
            temp
          }
          _ => unreachable!("no coercion between {from} and {to}"),
        }
      }
      Expr::Binary {
        op,
        lhs,
        rhs,
        ty,
        line,
      } => {
        let result_ty = ty.as_ref().expect("expressions are typed before lowering");
        match result_ty {
          Type::Array(elem, len) => self.emit_broadcast(*op, lhs, rhs, elem, *len, *line),
          _ => self.emit_scalar_binary(*op, lhs, rhs, result_ty, *line),
        }
      }
      Expr::Call { .. } => self
        .emit_call(expr)
        .expect("expression calls always produce a value"),
    }
  }

  fn emit_scalar_binary(
    &mut self,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    result_ty: &Type,
    line: u32,
  ) -> String {
    let operand_ty = lhs
      .ty()
      .expect("expressions are typed before lowering")
      .clone();
    let lhs_op = self.emit_expr(lhs);
    let rhs_op = self.emit_expr(rhs);
    let temp = self.fresh_temp();

    if operand_ty == Type::Str {
      let relation = if op == BinaryOp::Eq { "==" } else { "!=" };
      self.line(&format!(
        "int {temp} = (strcmp({lhs_op}, {rhs_op}) {relation} 0);"
      ));
      return temp;
    }

    if op.is_logical() && operand_ty == Type::Bool {
      self.line(&format!(
        "validateBooleanOp({lhs_op}, '{}', {rhs_op}, {line});",
        op.symbol()
      ));
    }
    self.line(&format!(
      "{} {temp} = {lhs_op} {} {rhs_op};",
      scalar_c_type(result_ty),
      op.symbol()
    ));
    temp
  }

  /// Element-wise lowering of an array-typed operator: a loop over the
  /// declared length writing into a fresh array temporary.
  fn emit_broadcast(
    &mut self,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    elem_ty: &Type,
    len: i64,
    line: u32,
  ) -> String {
    let left = self.broadcast_operand(lhs);
    let right = self.broadcast_operand(rhs);
    let string_operands = matches!(left.elem_ty, Type::Str);

    let temp = self.fresh_temp();
    self.line(&format!("{} {temp}[{len}];", scalar_c_type(elem_ty)));
    let idx = self.fresh_index();
    self.line(&format!("for (int {idx} = 0; {idx} < {len}; {idx}++) {{"));
    self.indent += 1;

    let lhs_elem = left.element(&idx);
    let rhs_elem = right.element(&idx);
    if string_operands {
      let relation = if op == BinaryOp::Eq { "==" } else { "!=" };
      self.line(&format!(
        "{temp}[{idx}] = (strcmp({lhs_elem}, {rhs_elem}) {relation} 0);"
      ));
    } else {
      if op.is_logical() && *elem_ty == Type::Bool {
        self.line(&format!(
          "validateBooleanOp({lhs_elem}, '{}', {rhs_elem}, {line});",
          op.symbol()
        ));
      }
      self.line(&format!(
        "{temp}[{idx}] = {lhs_elem} {} {rhs_elem};",
        op.symbol()
      ));
    }

    self.indent -= 1;
    self.line("}");
    temp
  }

  /// Lower one operand of a broadcast. Array-to-array casts are peeled off
  /// and re-applied per element inside the loop.
  fn broadcast_operand(&mut self, expr: &Expr) -> BroadcastOperand {
    if let Expr::Cast {
      operand, from, to, ..
    } = expr
      && (from.is_array() || to.is_array())
    {
      let mut inner = self.broadcast_operand(operand);
      inner.cast_to = Some(to.element().clone());
      inner.elem_ty = to.element().clone();
      return inner;
    }

    let ty = expr
      .ty()
      .expect("expressions are typed before lowering")
      .clone();
    let operand = self.emit_expr(expr);
    BroadcastOperand {
      operand,
      is_array: ty.is_array(),
      elem_ty: ty.element().clone(),
      cast_to: None,
    }
  }

  // ----- Calls -----

  /// A call in statement position; a value-returning builtin is evaluated
  /// for its side effect and the result is dropped.
  fn emit_call_statement(&mut self, call: &Expr) {
    let _ = self.emit_call(call);
  }

  /// Lower a call; returns the operand holding the result for
  /// value-returning procedures, `None` for void ones.
  fn emit_call(&mut self, call: &Expr) -> Option<String> {
    let Expr::Call {
      name: _,
      args,
      sym,
      ty,
      line: _,
    } = call
    else {
      unreachable!("emit_call takes call nodes only");
    };
    let sym_id = sym.expect("calls are resolved before lowering");
    let symbol = self.symbols.symbol(sym_id);
    let SymbolKind::Proc(sig) = &symbol.kind else {
      unreachable!("call targets are procedures");
    };

    let callee = if sig.builtin {
      symbol.name.clone()
    } else {
      self
        .names
        .get(&sym_id)
        .expect("every resolved symbol has a C spelling")
        .clone()
    };

    let mut operands = Vec::with_capacity(args.len());
    let param_dirs: Vec<(Type, Direction)> = sig.params.clone();
    for (arg, (param_ty, direction)) in args.iter().zip(&param_dirs) {
      let operand = match direction {
        Direction::In => self.emit_expr(arg),
        Direction::Out => self.emit_out_argument(arg, param_ty),
      };
      operands.push(operand);
    }
    let arg_list = operands.join(", ");

    match ty {
      Some(Type::Str) => {
        // The runtime fills a caller-provided buffer.
        let temp = self.fresh_temp();
        self.line(&format!("char {temp}[{STRING_BYTES}];"));
        self.line(&format!("{callee}({temp});"));
        Some(temp)
      }
      Some(ret) => {
        let temp = self.fresh_temp();
        self.line(&format!(
          "{} {temp} = {callee}({arg_list});",
          scalar_c_type(ret)
        ));
        Some(temp)
      }
      None => {
        self.line(&format!("{callee}({arg_list});"));
        None
      }
    }
  }

  fn emit_out_argument(&mut self, arg: &Expr, param_ty: &Type) -> String {
    let lvalue = match arg {
      Expr::Ref { sym, .. } => self
        .names
        .get(&sym.expect("references are resolved before lowering"))
        .expect("every resolved symbol has a C spelling")
        .clone(),
      Expr::Index { sym, index, .. } => {
        let base = self
          .names
          .get(&sym.expect("references are resolved before lowering"))
          .expect("every resolved symbol has a C spelling")
          .clone();
        let index_op = self.emit_expr(index);
        format!("{base}[{index_op}]")
      }
      _ => unreachable!("out arguments are l-values"),
    };
    // Arrays and strings are already addresses.
    if param_ty.is_scalar() && *param_ty != Type::Str {
      format!("&{lvalue}")
    } else {
      lvalue
    }
  }

  // ----- Output helpers -----

  fn fresh_temp(&mut self) -> String {
    let n = self.temp;
    self.temp += 1;
    format!("_t{n}")
  }

  fn fresh_index(&mut self) -> String {
    let n = self.index_temp;
    self.index_temp += 1;
    format!("_i{n}")
  }

  fn line(&mut self, text: &str) {
    for _ in 0..self.indent {
      self.out.push_str("  ");
    }
    self.out.push_str(text);
    self.out.push('\n');
  }

  fn blank(&mut self) {
    self.out.push('\n');
  }
}

struct BroadcastOperand {
  operand: String,
  is_array: bool,
  elem_ty: Type,
  cast_to: Option<Type>,
}

impl BroadcastOperand {
  fn element(&self, idx: &str) -> String {
    let raw = if self.is_array {
      format!("{}[{idx}]", self.operand)
    } else {
      self.operand.clone()
    };
    match &self.cast_to {
      Some(Type::Float) => format!("(float){raw}"),
      Some(Type::Bool) => format!("({raw} != 0)"),
      Some(Type::Int) => format!("(int){raw}"),
      _ => raw,
    }
  }
}

fn collect_procs(decls: &[Decl]) -> Vec<&ProcDecl> {
  let mut procs = Vec::new();
  for decl in decls {
    if let Decl::Proc(proc) = decl {
      procs.push(proc);
      procs.extend(collect_procs(&proc.decls));
    }
  }
  procs
}

fn stmt_line(stmt: &Stmt) -> u32 {
  match stmt {
    Stmt::Assign(assign) => assign.line,
    Stmt::If { line, .. } | Stmt::For { line, .. } | Stmt::Return { line } => *line,
    Stmt::Call(call) => call.line(),
  }
}

fn c_ident(name: &str) -> String {
  if is_c_keyword(name) {
    format!("{name}_")
  } else {
    name.to_string()
  }
}

fn scalar_c_type(ty: &Type) -> &'static str {
  match ty {
    Type::Int | Type::Bool => "int",
    Type::Float => "float",
    Type::Str => "char *",
    Type::Array(..) => unreachable!("array values never live in a scalar temporary"),
  }
}

/// C declaration for a source variable, with zero-initialisation for
/// locals (file-scope variables are zeroed by the C runtime already).
fn declare_var(name: &str, ty: &Type, init: bool) -> String {
  let decl = match ty {
    Type::Int | Type::Bool => format!("int {name}"),
    Type::Float => format!("float {name}"),
    Type::Str => format!("char {name}[{STRING_BYTES}]"),
    Type::Array(elem, len) => match **elem {
      Type::Str => format!("char {name}[{len}][{STRING_BYTES}]"),
      Type::Float => format!("float {name}[{len}]"),
      _ => format!("int {name}[{len}]"),
    },
  };
  if !init {
    return decl;
  }
  match ty {
    Type::Int | Type::Bool | Type::Float => format!("{decl} = 0"),
    Type::Str => format!("{decl} = \"\""),
    Type::Array(..) => format!("{decl} = {{0}}"),
  }
}

fn param_decl(name: &str, ty: &Type, direction: Direction) -> String {
  match (ty, direction) {
    (Type::Str, _) => format!("char *{name}"),
    (Type::Array(elem, len), _) => match **elem {
      Type::Str => format!("char {name}[{len}][{STRING_BYTES}]"),
      Type::Float => format!("float {name}[{len}]"),
      _ => format!("int {name}[{len}]"),
    },
    (scalar, Direction::In) => format!("{} {name}", scalar_c_type(scalar)),
    (scalar, Direction::Out) => format!("{} *{name}", scalar_c_type(scalar)),
  }
}

fn literal_operand(value: &LitValue) -> String {
  match value {
    LitValue::Int(n) => n.to_string(),
    LitValue::Float(x) => format!("{x:?}"),
    LitValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
    LitValue::Str(s) => format!("\"{s}\""),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::optimizer::optimize;
  use crate::parser::parse;
  use crate::scanner::scan;
  use crate::typecheck::check;

  fn emit(src: &str, level: u8, verbose: bool) -> String {
    let mut program = parse(scan(src).unwrap()).unwrap();
    let symbols = check(&mut program, true).unwrap();
    optimize(&mut program, &symbols, level);
    generate(&program, &symbols, verbose)
  }

  #[test]
  fn output_is_deterministic() {
    let src = "program p is int a[4]; float f; begin \
                 a := a + 1; f := 2.5; putInteger(a[2]); \
               end program";
    assert_eq!(emit(src, 2, true), emit(src, 2, true));
  }

  #[test]
  fn the_unit_includes_the_runtime_header() {
    let c = emit("program p is begin end program", 0, false);
    assert!(c.starts_with("#include \"runtime.h\""));
    assert!(c.contains("int main() {"));
    assert!(c.trim_end().ends_with('}'));
  }

  #[test]
  fn expressions_lower_into_fresh_temporaries() {
    let c = emit(
      "program p is begin putInteger(1 + 2 * 3); end program",
      0,
      false,
    );
    assert!(c.contains("int _t0 = 2 * 3;"), "got:\n{c}");
    assert!(c.contains("int _t1 = 1 + _t0;"), "got:\n{c}");
    assert!(c.contains("putInteger(_t1);"), "got:\n{c}");
  }

  #[test]
  fn temporaries_reset_at_each_function_entry() {
    let c = emit(
      "program p is \
         procedure f(int x in) int y; begin y := x + 1; end procedure; \
       begin putInteger(2 + 3); end program",
      0,
      false,
    );
    assert_eq!(c.matches("int _t0 = ").count(), 2, "got:\n{c}");
  }

  #[test]
  fn folded_branches_leave_no_if_behind() {
    let c = emit(
      "program p is begin \
         if (1 == 1) then putInteger(1); else putInteger(2); end if; \
       end program",
      1,
      false,
    );
    assert!(!c.contains("if ("), "got:\n{c}");
    assert!(c.contains("putInteger(1);"));
    assert!(!c.contains("putInteger(2);"));
  }

  #[test]
  fn unoptimised_branches_lower_to_c_ifs() {
    let c = emit(
      "program p is begin \
         if (1 == 1) then putInteger(1); else putInteger(2); end if; \
       end program",
      0,
      false,
    );
    assert!(c.contains("int _t0 = 1 == 1;"), "got:\n{c}");
    assert!(c.contains("if (_t0) {"), "got:\n{c}");
    assert!(c.contains("} else {"), "got:\n{c}");
  }

  #[test]
  fn broadcasts_lower_to_loops() {
    let c = emit(
      "program p is int a[4]; begin a := a + 1; putInteger(a[2]); end program",
      0,
      false,
    );
    assert!(c.contains("int _t0[4];"), "got:\n{c}");
    assert!(
      c.contains("for (int _i0 = 0; _i0 < 4; _i0++) {"),
      "got:\n{c}"
    );
    assert!(c.contains("_t0[_i0] = a[_i0] + 1;"), "got:\n{c}");
  }

  #[test]
  fn bool_logic_validates_operands_at_runtime() {
    let c = emit(
      "program p is bool a; bool b; bool c; begin c := a & b; end program",
      0,
      false,
    );
    assert!(c.contains("validateBooleanOp(a, '&', b, 1);"), "got:\n{c}");
    assert!(c.contains("int _t0 = a & b;"), "got:\n{c}");
  }

  #[test]
  fn int_bitwise_logic_skips_validation() {
    let c = emit(
      "program p is int a; int b; int c; begin c := a | b; end program",
      0,
      false,
    );
    assert!(!c.contains("validateBooleanOp"), "got:\n{c}");
    assert!(c.contains("int _t0 = a | b;"), "got:\n{c}");
  }

  #[test]
  fn coercions_emit_casts() {
    let c = emit(
      "program p is float f; int i; begin f := i + 1.5; f := i; end program",
      0,
      false,
    );
    assert!(c.contains("float _t0 = (float)i;"), "got:\n{c}");
    assert!(c.contains("float _t2 = (float)i;"), "got:\n{c}");
  }

  #[test]
  fn int_to_bool_casts_compare_against_zero() {
    let c = emit(
      "program p is bool b; int i; begin b := i; end program",
      0,
      false,
    );
    assert!(c.contains("int _t0 = (i != 0);"), "got:\n{c}");
  }

  #[test]
  fn out_parameters_travel_as_pointers() {
    let c = emit(
      "program p is \
         int x; \
         procedure read(int r out) begin r := getInteger(); end procedure; \
       begin read(x); putInteger(x); end program",
      0,
      false,
    );
    assert!(c.contains("void read(int *r);"), "got:\n{c}");
    assert!(c.contains("(*r) = _t0;"), "got:\n{c}");
    assert!(c.contains("read(&x);"), "got:\n{c}");
  }

  #[test]
  fn get_string_fills_a_fresh_buffer() {
    let c = emit(
      "program p is string s; begin s := getString(); end program",
      0,
      false,
    );
    assert!(c.contains("char _t0[256];"), "got:\n{c}");
    assert!(c.contains("getString(_t0);"), "got:\n{c}");
    assert!(c.contains("strcpy(s, _t0);"), "got:\n{c}");
  }

  #[test]
  fn string_equality_lowers_to_strcmp() {
    let c = emit(
      "program p is string s; bool b; begin b := s == \"done\"; end program",
      0,
      false,
    );
    assert!(c.contains("int _t0 = (strcmp(s, \"done\") == 0);"), "got:\n{c}");
  }

  #[test]
  fn whole_array_assignment_copies_elementwise() {
    let c = emit(
      "program p is int a[3]; int b[3]; begin a := b; end program",
      0,
      false,
    );
    assert!(c.contains("a[_i0] = b[_i0];"), "got:\n{c}");
  }

  #[test]
  fn globals_live_at_file_scope() {
    let c = emit(
      "program p is global int shared; int local; begin local := 1; end program",
      0,
      false,
    );
    let main_at = c.find("int main()").unwrap();
    let shared_at = c.find("int shared;").unwrap();
    let local_at = c.find("int local = 0;").unwrap();
    assert!(shared_at < main_at);
    assert!(local_at > main_at);
  }

  #[test]
  fn for_loops_reevaluate_their_condition() {
    let c = emit(
      "program p is int i; begin \
         for (i := 0; i < 3) i := i + 1; end for; \
       end program",
      0,
      false,
    );
    assert!(c.contains("i = 0;"), "got:\n{c}");
    assert!(c.contains("for (;;) {"), "got:\n{c}");
    assert!(c.contains("if (!(_t0)) break;"), "got:\n{c}");
  }

  #[test]
  fn returns_differ_between_main_and_procedures() {
    let c = emit(
      "program p is \
         procedure f() begin return; end procedure; \
       begin f(); return; end program",
      0,
      false,
    );
    assert!(c.contains("return;"), "got:\n{c}");
    assert!(c.matches("return 0;").count() >= 1, "got:\n{c}");
  }

  #[test]
  fn verbose_mode_annotates_source_lines() {
    let c = emit(
      "program p is\nint x;\nbegin\nx := 1;\nputInteger(x);\nend program",
      0,
      true,
    );
    assert!(c.contains("/* line 4 */"), "got:\n{c}");
    assert!(c.contains("/* line 5 */"), "got:\n{c}");
  }

  #[test]
  fn keyword_identifiers_are_renamed() {
    let c = emit(
      "program p is int register; begin register := 1; end program",
      0,
      false,
    );
    assert!(c.contains("int register_ = 0;"), "got:\n{c}");
  }

  #[test]
  fn colliding_procedure_names_stay_unique() {
    let c = emit(
      "program p is \
         procedure outer() \
           procedure helper() begin return; end procedure; \
         begin helper(); end procedure; \
         procedure helper() begin return; end procedure; \
       begin helper(); end program",
      0,
      false,
    );
    assert!(c.contains("void helper();"), "got:\n{c}");
    assert!(c.contains("void helper_2();"), "got:\n{c}");
  }
}
