//! Tree optimisation: constant folding, algebraic identities, dead code.
//!
//! Level 0 is the identity. Level 1 folds constants bottom-up and replaces
//! branches whose condition folded to a literal with the selected arm.
//! Level 2 adds algebraic identities on pure operands and removes
//! assignments whose target is never read again in the same straight-line
//! body. The optimiser operates on well-typed trees only and never emits
//! an error; the order and occurrence of every call is preserved because
//! calls may perform I/O.

use log::debug;

use crate::ast::{Assign, BinaryOp, Decl, Expr, LitValue, Program, Stmt, UnaryOp};
use crate::symtab::{SymbolId, SymbolKind, SymbolTable};
use crate::ty::Type;

pub fn optimize(program: &mut Program, symbols: &SymbolTable, level: u8) {
  if level == 0 {
    return;
  }
  let mut optimizer = Optimizer {
    level,
    symbols,
    changed: false,
  };
  let mut rounds = 0u32;
  loop {
    optimizer.changed = false;
    optimizer.visit_decls(&mut program.decls);
    optimizer.visit_top_body(&mut program.body);
    rounds += 1;
    if !optimizer.changed {
      break;
    }
  }
  debug!("optimiser converged after {rounds} round(s) at level {level}");
}

struct Optimizer<'a> {
  level: u8,
  symbols: &'a SymbolTable,
  changed: bool,
}

impl Optimizer<'_> {
  fn visit_decls(&mut self, decls: &mut [Decl]) {
    for decl in decls.iter_mut() {
      if let Decl::Proc(proc) = decl {
        self.visit_decls(&mut proc.decls);
        self.visit_top_body(&mut proc.body);
      }
    }
  }

  /// A procedure or program body: fold everything, then clean up stores
  /// that are dead within this straight-line scope.
  fn visit_top_body(&mut self, body: &mut Vec<Stmt>) {
    self.visit_list(body);
    if self.level >= 2 {
      self.eliminate_dead_stores(body);
    }
  }

  fn visit_list(&mut self, body: &mut Vec<Stmt>) {
    for stmt in body.iter_mut() {
      self.visit_stmt(stmt);
    }
    self.prune_constant_branches(body);
  }

  fn visit_stmt(&mut self, stmt: &mut Stmt) {
    match stmt {
      Stmt::Assign(assign) => self.visit_assign(assign),
      Stmt::If {
        cond,
        then_body,
        else_body,
        ..
      } => {
        self.fold_expr(cond);
        self.visit_list(then_body);
        self.visit_list(else_body);
      }
      Stmt::For {
        init, cond, body, ..
      } => {
        self.visit_assign(init);
        self.fold_expr(cond);
        self.visit_list(body);
      }
      Stmt::Return { .. } => {}
      Stmt::Call(call) => {
        if let Expr::Call { args, .. } = call {
          for arg in args.iter_mut() {
            self.fold_expr(arg);
          }
        }
      }
    }
  }

  fn visit_assign(&mut self, assign: &mut Assign) {
    if let Some(index) = assign.target.index.as_mut() {
      self.fold_expr(index);
    }
    self.fold_expr(&mut assign.value);
  }

  /// Replace an `If` on a literal condition by the selected arm, and a
  /// `For` on a literal false condition by its initialiser (which executes
  /// once regardless).
  fn prune_constant_branches(&mut self, body: &mut Vec<Stmt>) {
    let mut i = 0;
    while i < body.len() {
      let replacement = match &body[i] {
        Stmt::If {
          cond,
          then_body,
          else_body,
          ..
        } => match const_bool(cond) {
          Some(true) => Some(then_body.clone()),
          Some(false) => Some(else_body.clone()),
          None => None,
        },
        Stmt::For { init, cond, .. } => match const_bool(cond) {
          Some(false) => Some(vec![Stmt::Assign(init.clone())]),
          _ => None,
        },
        _ => None,
      };
      match replacement {
        Some(stmts) => {
          self.changed = true;
          let advance = stmts.len();
          body.splice(i..=i, stmts);
          i += advance;
        }
        None => i += 1,
      }
    }
  }

  // ----- Constant folding -----

  fn fold_expr(&mut self, expr: &mut Expr) {
    match expr {
      Expr::Binary { lhs, rhs, .. } => {
        self.fold_expr(lhs);
        self.fold_expr(rhs);
      }
      Expr::Unary { operand, .. } => self.fold_expr(operand),
      Expr::Cast { operand, .. } => self.fold_expr(operand),
      Expr::Index { index, .. } => self.fold_expr(index),
      Expr::Call { args, .. } => {
        for arg in args.iter_mut() {
          self.fold_expr(arg);
        }
      }
      Expr::Lit { .. } | Expr::Ref { .. } => {}
    }

    if let Some(folded) = self.fold_node(expr) {
      self.changed = true;
      *expr = folded;
    }
  }

  fn fold_node(&self, expr: &Expr) -> Option<Expr> {
    match expr {
      Expr::Binary {
        op,
        lhs,
        rhs,
        ty: Some(ty),
        line,
      } if ty.is_scalar() => {
        if let (Some(left), Some(right)) = (as_lit(lhs), as_lit(rhs))
          && let Some(value) = eval_binary(*op, left, right)
        {
          return Some(lit_expr(value, *line));
        }
        if self.level >= 2 {
          return identity(*op, lhs, rhs, ty, *line);
        }
        None
      }
      Expr::Unary {
        op,
        operand,
        line,
        ..
      } => {
        let value = eval_unary(*op, as_lit(operand)?)?;
        Some(lit_expr(value, *line))
      }
      Expr::Cast {
        operand,
        from,
        to,
        line,
      } if from.is_scalar() && to.is_scalar() => {
        let value = eval_cast(as_lit(operand)?, to)?;
        Some(lit_expr(value, *line))
      }
      _ => None,
    }
  }

  // ----- Dead store elimination -----

  /// Remove assignments to non-global, non-parameter scalars of this body
  /// that no later statement reads. The value must be call-free so no I/O
  /// disappears with the store.
  fn eliminate_dead_stores(&mut self, body: &mut Vec<Stmt>) {
    let mut i = 0;
    while i < body.len() {
      let dead = match &body[i] {
        Stmt::Assign(assign) => match assign.target.sym {
          Some(sym) => {
            assign.target.index.is_none()
              && self.is_local_storage(assign.target.sym)
              && is_call_free(&assign.value)
              && store_is_dead(&body[i + 1..], sym)
          }
          None => false,
        },
        _ => false,
      };
      if dead {
        body.remove(i);
        self.changed = true;
      } else {
        i += 1;
      }
    }
  }

  fn is_local_storage(&self, sym: Option<SymbolId>) -> bool {
    let Some(id) = sym else {
      return false;
    };
    matches!(
      self.symbols.symbol(id).kind,
      SymbolKind::Var {
        is_global: false,
        param: None,
        ..
      }
    )
  }
}

fn const_bool(expr: &Expr) -> Option<bool> {
  match expr {
    Expr::Lit {
      value: LitValue::Bool(b),
      ..
    } => Some(*b),
    _ => None,
  }
}

fn as_lit(expr: &Expr) -> Option<&LitValue> {
  match expr {
    Expr::Lit { value, .. } => Some(value),
    _ => None,
  }
}

fn lit_expr(value: LitValue, line: u32) -> Expr {
  let ty = match &value {
    LitValue::Int(_) => Type::Int,
    LitValue::Float(_) => Type::Float,
    LitValue::Bool(_) => Type::Bool,
    LitValue::Str(_) => Type::Str,
  };
  Expr::Lit {
    value,
    ty: Some(ty),
    line,
  }
}

fn eval_binary(op: BinaryOp, left: &LitValue, right: &LitValue) -> Option<LitValue> {
  use LitValue::{Bool, Float, Int};
  let value = match (left, right) {
    (Int(a), Int(b)) => match op {
      BinaryOp::Add => Int(a.wrapping_add(*b)),
      BinaryOp::Sub => Int(a.wrapping_sub(*b)),
      BinaryOp::Mul => Int(a.wrapping_mul(*b)),
      BinaryOp::Div => Int(a.checked_div(*b)?),
      BinaryOp::And => Int(a & b),
      BinaryOp::Or => Int(a | b),
      BinaryOp::Eq => Bool(a == b),
      BinaryOp::Ne => Bool(a != b),
      BinaryOp::Lt => Bool(a < b),
      BinaryOp::Le => Bool(a <= b),
      BinaryOp::Gt => Bool(a > b),
      BinaryOp::Ge => Bool(a >= b),
    },
    (Float(a), Float(b)) => match op {
      BinaryOp::Add => Float(a + b),
      BinaryOp::Sub => Float(a - b),
      BinaryOp::Mul => Float(a * b),
      BinaryOp::Div => Float(a / b),
      BinaryOp::Eq => Bool(a == b),
      BinaryOp::Ne => Bool(a != b),
      BinaryOp::Lt => Bool(a < b),
      BinaryOp::Le => Bool(a <= b),
      BinaryOp::Gt => Bool(a > b),
      BinaryOp::Ge => Bool(a >= b),
      BinaryOp::And | BinaryOp::Or => return None,
    },
    (Bool(a), Bool(b)) => match op {
      BinaryOp::And => Bool(*a && *b),
      BinaryOp::Or => Bool(*a || *b),
      BinaryOp::Eq => Bool(a == b),
      BinaryOp::Ne => Bool(a != b),
      _ => return None,
    },
    _ => return None,
  };
  Some(value)
}

fn eval_unary(op: UnaryOp, operand: &LitValue) -> Option<LitValue> {
  use LitValue::{Bool, Float, Int};
  let value = match (op, operand) {
    (UnaryOp::Neg, Int(n)) => Int(n.wrapping_neg()),
    (UnaryOp::Neg, Float(x)) => Float(-x),
    (UnaryOp::Not, Bool(b)) => Bool(!b),
    // Bitwise complement acts on the 32-bit value.
    (UnaryOp::Not, Int(n)) => Int(!(*n as u32) as i64),
    _ => return None,
  };
  Some(value)
}

fn eval_cast(operand: &LitValue, to: &Type) -> Option<LitValue> {
  use LitValue::{Bool, Float, Int};
  let value = match (operand, to) {
    (Int(n), Type::Float) => Float(*n as f64),
    (Int(n), Type::Bool) => Bool(*n != 0),
    (Bool(b), Type::Int) => Int(*b as i64),
    _ => return None,
  };
  Some(value)
}

/// Algebraic identities on scalar nodes: neutral and absorbing elements.
/// An operand may only be discarded when it is pure.
fn identity(op: BinaryOp, lhs: &Expr, rhs: &Expr, ty: &Type, line: u32) -> Option<Expr> {
  use LitValue::{Bool, Int};
  let left = as_lit(lhs);
  let right = as_lit(rhs);

  match op {
    BinaryOp::Add => {
      if matches!(right, Some(Int(0))) {
        return Some(lhs.clone());
      }
      if matches!(left, Some(Int(0))) {
        return Some(rhs.clone());
      }
    }
    BinaryOp::Sub => {
      if matches!(right, Some(Int(0))) {
        return Some(lhs.clone());
      }
      if *ty == Type::Int && lhs == rhs && is_pure(lhs) {
        return Some(lit_expr(Int(0), line));
      }
    }
    BinaryOp::Mul => {
      if matches!(right, Some(Int(1))) {
        return Some(lhs.clone());
      }
      if matches!(left, Some(Int(1))) {
        return Some(rhs.clone());
      }
      if matches!(right, Some(Int(0))) && is_pure(lhs) {
        return Some(lit_expr(Int(0), line));
      }
      if matches!(left, Some(Int(0))) && is_pure(rhs) {
        return Some(lit_expr(Int(0), line));
      }
    }
    BinaryOp::Div => {
      if matches!(right, Some(Int(1))) {
        return Some(lhs.clone());
      }
    }
    BinaryOp::And => match ty {
      Type::Bool => {
        if matches!(right, Some(Bool(true))) {
          return Some(lhs.clone());
        }
        if matches!(left, Some(Bool(true))) {
          return Some(rhs.clone());
        }
        if matches!(right, Some(Bool(false))) && is_pure(lhs) {
          return Some(lit_expr(Bool(false), line));
        }
        if matches!(left, Some(Bool(false))) && is_pure(rhs) {
          return Some(lit_expr(Bool(false), line));
        }
      }
      Type::Int => {
        if matches!(right, Some(Int(0))) && is_pure(lhs) {
          return Some(lit_expr(Int(0), line));
        }
        if matches!(left, Some(Int(0))) && is_pure(rhs) {
          return Some(lit_expr(Int(0), line));
        }
      }
      _ => {}
    },
    BinaryOp::Or => match ty {
      Type::Bool => {
        if matches!(right, Some(Bool(false))) {
          return Some(lhs.clone());
        }
        if matches!(left, Some(Bool(false))) {
          return Some(rhs.clone());
        }
        if matches!(right, Some(Bool(true))) && is_pure(lhs) {
          return Some(lit_expr(Bool(true), line));
        }
        if matches!(left, Some(Bool(true))) && is_pure(rhs) {
          return Some(lit_expr(Bool(true), line));
        }
      }
      Type::Int => {
        if matches!(right, Some(Int(0))) {
          return Some(lhs.clone());
        }
        if matches!(left, Some(Int(0))) {
          return Some(rhs.clone());
        }
      }
      _ => {}
    },
    _ => {}
  }
  None
}

/// A pure expression has no side effects and may be duplicated or dropped.
fn is_pure(expr: &Expr) -> bool {
  match expr {
    Expr::Lit { .. } | Expr::Ref { .. } => true,
    Expr::Index { index, .. } => is_pure(index),
    Expr::Unary { operand, .. } => is_pure(operand),
    Expr::Cast { operand, .. } => is_pure(operand),
    Expr::Binary { lhs, rhs, .. } => is_pure(lhs) && is_pure(rhs),
    Expr::Call { .. } => false,
  }
}

fn is_call_free(expr: &Expr) -> bool {
  is_pure(expr)
}

/// Scan forward from the store: a read makes it live, a full overwrite of
/// the same scalar kills it, and the end of the body is a kill because the
/// variable's scope dies with the body.
fn store_is_dead(rest: &[Stmt], sym: SymbolId) -> bool {
  for stmt in rest {
    if let Stmt::Assign(assign) = stmt
      && assign.target.sym == Some(sym)
      && assign.target.index.is_none()
    {
      return !expr_reads(&assign.value, sym);
    }
    if stmt_reads(stmt, sym) {
      return false;
    }
  }
  true
}

/// Does this statement (or anything nested in it) read the symbol? A plain
/// scalar re-assignment of the same target does not count as a read.
fn stmt_reads(stmt: &Stmt, sym: SymbolId) -> bool {
  match stmt {
    Stmt::Assign(assign) => {
      let target_reads = match &assign.target.index {
        Some(index) => assign.target.sym == Some(sym) || expr_reads(index, sym),
        None => false,
      };
      target_reads || expr_reads(&assign.value, sym)
    }
    Stmt::If {
      cond,
      then_body,
      else_body,
      ..
    } => {
      expr_reads(cond, sym)
        || then_body.iter().any(|s| stmt_reads(s, sym))
        || else_body.iter().any(|s| stmt_reads(s, sym))
    }
    Stmt::For {
      init, cond, body, ..
    } => {
      stmt_reads(&Stmt::Assign(init.clone()), sym)
        || expr_reads(cond, sym)
        || body.iter().any(|s| stmt_reads(s, sym))
    }
    Stmt::Return { .. } => false,
    Stmt::Call(call) => expr_reads(call, sym),
  }
}

fn expr_reads(expr: &Expr, sym: SymbolId) -> bool {
  match expr {
    Expr::Ref { sym: s, .. } => *s == Some(sym),
    Expr::Index { sym: s, index, .. } => *s == Some(sym) || expr_reads(index, sym),
    Expr::Lit { .. } => false,
    Expr::Unary { operand, .. } => expr_reads(operand, sym),
    Expr::Cast { operand, .. } => expr_reads(operand, sym),
    Expr::Binary { lhs, rhs, .. } => expr_reads(lhs, sym) || expr_reads(rhs, sym),
    Expr::Call { args, .. } => args.iter().any(|arg| expr_reads(arg, sym)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::scanner::scan;
  use crate::typecheck::check;

  fn optimized(src: &str, level: u8) -> Program {
    let mut program = parse(scan(src).unwrap()).unwrap();
    let symbols = check(&mut program, true).unwrap();
    optimize(&mut program, &symbols, level);
    program
  }

  // The trailing read keeps the probe assignment alive through the
  // dead-store pass at level 2.
  fn fold_value(expr_src: &str, level: u8) -> Expr {
    let src = format!(
      "program t is int v; float f; bool b; int a[4]; begin v := {expr_src}; putInteger(v); end program"
    );
    let program = optimized(&src, level);
    match program.body.into_iter().next() {
      Some(Stmt::Assign(assign)) => assign.value,
      other => panic!("expected the assignment to survive, got {other:?}"),
    }
  }

  fn int_value(expr: &Expr) -> i64 {
    match expr {
      Expr::Lit {
        value: LitValue::Int(n),
        ..
      } => *n,
      // Assignment coercion may wrap a folded bool.
      Expr::Cast { operand, .. } => match operand.as_ref() {
        Expr::Lit {
          value: LitValue::Bool(b),
          ..
        } => *b as i64,
        other => panic!("expected literal, got {other:?}"),
      },
      other => panic!("expected int literal, got {other:?}"),
    }
  }

  #[test]
  fn binary_operators_fold_over_literals() {
    for (src, expected) in [
      ("2 + 3", 5),
      ("2 - 3", -1),
      ("2 * 3", 6),
      ("2 / 3", 0),
      ("7 / 2", 3),
      ("2 & 3", 2),
      ("2 | 3", 3),
    ] {
      assert_eq!(int_value(&fold_value(src, 1)), expected, "for {src}");
    }
  }

  #[test]
  fn comparisons_fold_to_bools() {
    for (src, expected) in [
      ("2 < 3", 1),
      ("2 > 3", 0),
      ("2 <= 3", 1),
      ("2 >= 3", 0),
      ("2 == 3", 0),
      ("2 != 3", 1),
    ] {
      assert_eq!(int_value(&fold_value(src, 1)), expected, "for {src}");
    }
  }

  #[test]
  fn boolean_logic_folds() {
    for (src, expected) in [
      ("true & true", 1),
      ("true & false", 0),
      ("false | true", 1),
      ("false | false", 0),
      ("not true", 0),
      ("not false", 1),
    ] {
      assert_eq!(int_value(&fold_value(src, 1)), expected, "for {src}");
    }
  }

  #[test]
  fn unary_minus_folds() {
    assert_eq!(int_value(&fold_value("-3", 1)), -3);
  }

  #[test]
  fn bitwise_not_acts_on_32_bits() {
    assert_eq!(int_value(&fold_value("not 4294967280", 1)), 15);
  }

  #[test]
  fn division_by_literal_zero_is_left_for_the_runtime() {
    let expr = fold_value("1 / 0", 2);
    assert!(matches!(expr, Expr::Binary { .. }));
  }

  #[test]
  fn float_arithmetic_folds_through_coercions() {
    let src = "program t is float f; begin f := 1 + 2.5; end program";
    let program = optimized(src, 1);
    let Stmt::Assign(assign) = &program.body[0] else {
      panic!("expected assignment");
    };
    assert_eq!(
      assign.value,
      Expr::Lit {
        value: LitValue::Float(3.5),
        ty: Some(Type::Float),
        line: 1,
      }
    );
  }

  #[test]
  fn level_zero_changes_nothing() {
    let src = "program t is int v; begin v := 1 + 2; end program";
    let untouched = optimized(src, 0);
    let Stmt::Assign(assign) = &untouched.body[0] else {
      panic!("expected assignment");
    };
    assert!(matches!(assign.value, Expr::Binary { .. }));
  }

  #[test]
  fn true_branches_replace_the_if() {
    let src = "program t is begin \
                 if (1 == 1) then putInteger(1); else putInteger(2); end if; \
               end program";
    let program = optimized(src, 1);
    assert_eq!(program.body.len(), 1);
    match &program.body[0] {
      Stmt::Call(Expr::Call { args, .. }) => {
        assert_eq!(args[0], lit_expr(LitValue::Int(1), 1));
      }
      other => panic!("expected the selected arm, got {other:?}"),
    }
  }

  #[test]
  fn false_branches_select_the_else_arm() {
    let src = "program t is begin \
                 if (1 == 2) then putInteger(1); else putInteger(2); end if; \
               end program";
    let program = optimized(src, 1);
    assert_eq!(program.body.len(), 1);
    match &program.body[0] {
      Stmt::Call(Expr::Call { args, .. }) => {
        assert_eq!(args[0], lit_expr(LitValue::Int(2), 1));
      }
      other => panic!("expected the selected arm, got {other:?}"),
    }
  }

  #[test]
  fn never_entered_loops_keep_their_initialiser() {
    let src = "program t is int i; begin \
                 for (i := 3; false) putInteger(i); end for; \
                 putInteger(i); \
               end program";
    let program = optimized(src, 1);
    assert_eq!(program.body.len(), 2);
    assert!(matches!(&program.body[0], Stmt::Assign(a) if a.target.name == "i"));
  }

  #[test]
  fn algebraic_identities_need_level_two() {
    let one = fold_value("v + 0", 2);
    assert!(matches!(one, Expr::Ref { ref name, .. } if name == "v"));
    let still_binary = fold_value("v + 0", 1);
    assert!(matches!(still_binary, Expr::Binary { .. }));
  }

  #[test]
  fn identities_cover_neutral_and_absorbing_elements() {
    assert!(matches!(fold_value("v * 1", 2), Expr::Ref { .. }));
    assert!(matches!(fold_value("1 * v", 2), Expr::Ref { .. }));
    assert_eq!(int_value(&fold_value("v * 0", 2)), 0);
    assert_eq!(int_value(&fold_value("v - v", 2)), 0);
    assert!(matches!(fold_value("v / 1", 2), Expr::Ref { .. }));
    assert!(matches!(fold_value("v | 0", 2), Expr::Ref { .. }));
  }

  #[test]
  fn boolean_identities_respect_purity() {
    let src = "program t is bool b; begin b := b & true; end program";
    let program = optimized(src, 2);
    // b & true collapses to b, then the store b := b is itself dead.
    assert!(program.body.is_empty());
  }

  #[test]
  fn impure_operands_survive_absorption() {
    let src = "program t is int v; begin v := getInteger() * 0; v := v + 1; putInteger(v); end program";
    let program = optimized(src, 2);
    let Stmt::Assign(assign) = &program.body[0] else {
      panic!("expected assignment");
    };
    assert!(
      matches!(assign.value, Expr::Binary { .. }),
      "the call must not be folded away"
    );
  }

  #[test]
  fn dead_stores_are_removed_at_level_two() {
    let src = "program t is int a; begin a := 1; a := 2; putInteger(a); end program";
    let program = optimized(src, 2);
    assert_eq!(program.body.len(), 2);
    let Stmt::Assign(assign) = &program.body[0] else {
      panic!("expected assignment");
    };
    assert_eq!(int_value(&assign.value), 2);
  }

  #[test]
  fn stores_read_inside_loops_are_kept() {
    let src = "program t is int i; int n; begin \
                 n := 10; \
                 for (i := 0; i < n) i := i + 1; end for; \
               end program";
    let program = optimized(src, 2);
    assert!(
      matches!(&program.body[0], Stmt::Assign(a) if a.target.name == "n"),
      "n is read by the loop condition and must survive"
    );
  }

  #[test]
  fn stores_to_globals_and_out_params_are_kept() {
    let src = "program t is \
                 global int g; \
                 procedure f(int r out) begin r := 1; end procedure; \
               begin g := 5; end program";
    let program = optimized(src, 2);
    assert_eq!(program.body.len(), 1, "global store must survive");
    let Decl::Proc(proc) = &program.decls[1] else {
      panic!("expected procedure");
    };
    assert_eq!(proc.body.len(), 1, "out-parameter store must survive");
  }

  #[test]
  fn stores_with_calls_in_the_value_are_kept() {
    let src = "program t is int a; begin a := getInteger(); end program";
    let program = optimized(src, 2);
    assert_eq!(program.body.len(), 1);
  }

  #[test]
  fn whole_array_stores_survive_elementwise_writes() {
    let src = "program t is int a[4]; int b[4]; begin \
                 a := b + 1; \
                 a[0] := 9; \
                 putInteger(a[1]); \
               end program";
    let program = optimized(src, 2);
    assert_eq!(program.body.len(), 3);
  }
}
