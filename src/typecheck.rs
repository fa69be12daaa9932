//! Semantic analysis: symbol resolution, type inference and coercions.
//!
//! One top-down walk over the tree. Top-level declarations are recorded
//! before any body is checked so procedures may refer to each other;
//! within a procedure the same declare-then-check order applies. Every
//! expression node leaves the walk with a type, and wherever operand types
//! disagree in a permitted way a `Cast` node records the minimal implicit
//! coercion. Broadcasting shows up as an array-typed operator node; the
//! emitter lowers those to loops.

use crate::ast::{
  Assign, BinaryOp, Decl, Direction, Expr, LitValue, ProcDecl, Program, Stmt, Target, UnaryOp,
};
use crate::error::{CompileError, CompileResult};
use crate::symtab::{ProcSig, SymbolId, SymbolKind, SymbolTable};
use crate::ty::Type;

/// Check the whole program, attaching types and symbol bindings in place.
/// Returns the symbol arena for the code generator.
pub fn check(program: &mut Program, include_runtime: bool) -> CompileResult<SymbolTable> {
  let table = if include_runtime {
    SymbolTable::with_prelude()
  } else {
    SymbolTable::new()
  };
  let mut checker = Checker { table };
  checker.check_program(program)?;
  Ok(checker.table)
}

struct Checker {
  table: SymbolTable,
}

impl Checker {
  fn check_program(&mut self, program: &mut Program) -> CompileResult<()> {
    self.declare_decls(&mut program.decls, true)?;
    self.check_proc_bodies(&mut program.decls)?;
    self.check_statements(&mut program.body)
  }

  /// Record every declaration of a scope before checking any body, so that
  /// declarations may refer to each other regardless of order.
  fn declare_decls(&mut self, decls: &mut [Decl], at_program_scope: bool) -> CompileResult<()> {
    for decl in decls.iter_mut() {
      match decl {
        Decl::Var(var) => {
          if var.is_global && !at_program_scope {
            return Err(CompileError::semantic(
              var.line,
              "global declarations are only legal at program scope",
            ));
          }
          let kind = SymbolKind::Var {
            ty: var.ty.clone(),
            is_global: var.is_global,
            param: None,
          };
          var.sym = Some(self.table.declare(&var.name, kind, var.line, var.is_global)?);
        }
        Decl::Proc(proc) => {
          if proc.is_global && !at_program_scope {
            return Err(CompileError::semantic(
              proc.line,
              "global declarations are only legal at program scope",
            ));
          }
          let sig = SymbolKind::Proc(signature(proc));
          proc.sym = Some(self.table.declare(&proc.name, sig, proc.line, proc.is_global)?);
        }
      }
    }
    Ok(())
  }

  fn check_proc_bodies(&mut self, decls: &mut [Decl]) -> CompileResult<()> {
    for decl in decls.iter_mut() {
      if let Decl::Proc(proc) = decl {
        self.check_procedure(proc)?;
      }
    }
    Ok(())
  }

  fn check_procedure(&mut self, proc: &mut ProcDecl) -> CompileResult<()> {
    self.table.enter_scope();

    // The procedure sees itself, for recursion.
    self
      .table
      .declare(&proc.name, SymbolKind::Proc(signature(proc)), proc.line, false)?;

    for param in proc.params.iter_mut() {
      let kind = SymbolKind::Var {
        ty: param.var.ty.clone(),
        is_global: false,
        param: Some(param.direction),
      };
      param.var.sym = Some(
        self
          .table
          .declare(&param.var.name, kind, param.var.line, false)?,
      );
    }

    self.declare_decls(&mut proc.decls, false)?;
    self.check_proc_bodies(&mut proc.decls)?;
    self.check_statements(&mut proc.body)?;

    self.table.leave_scope();
    Ok(())
  }

  // ----- Statements -----

  fn check_statements(&mut self, statements: &mut [Stmt]) -> CompileResult<()> {
    for statement in statements.iter_mut() {
      self.check_statement(statement)?;
    }
    Ok(())
  }

  fn check_statement(&mut self, statement: &mut Stmt) -> CompileResult<()> {
    match statement {
      Stmt::Assign(assign) => self.check_assign(assign),
      Stmt::If {
        cond,
        then_body,
        else_body,
        ..
      } => {
        self.check_condition(cond)?;
        self.check_statements(then_body)?;
        self.check_statements(else_body)
      }
      Stmt::For {
        init, cond, body, ..
      } => {
        self.check_assign(init)?;
        self.check_condition(cond)?;
        self.check_statements(body)
      }
      Stmt::Return { .. } => Ok(()),
      Stmt::Call(call) => {
        self.check_call(call, true)?;
        Ok(())
      }
    }
  }

  fn check_condition(&mut self, cond: &mut Expr) -> CompileResult<()> {
    let ty = self.check_expr(cond)?;
    match ty {
      Type::Bool => Ok(()),
      Type::Int => {
        coerce(cond, Type::Bool);
        Ok(())
      }
      other => Err(CompileError::semantic(
        cond.line(),
        format!("condition must be bool, got {other}"),
      )),
    }
  }

  fn check_assign(&mut self, assign: &mut Assign) -> CompileResult<()> {
    let target_ty = self.check_target(&mut assign.target)?;
    let value_ty = self.check_expr(&mut assign.value)?;
    self.require_assignable(&mut assign.value, &value_ty, &target_ty, assign.line)
  }

  fn check_target(&mut self, target: &mut Target) -> CompileResult<Type> {
    let sym_id = self.resolve(&target.name, target.line)?;
    let symbol = self.table.symbol(sym_id);
    let Some(var_ty) = symbol.var_ty().cloned() else {
      return Err(CompileError::semantic(
        target.line,
        format!("{} is a procedure, not a variable", target.name),
      ));
    };
    if symbol.param_direction() == Some(Direction::In) {
      return Err(CompileError::semantic(
        target.line,
        format!("cannot assign to in parameter {}", target.name),
      ));
    }

    let ty = match target.index.as_mut() {
      Some(index) => {
        let name = target.name.clone();
        self.check_index(&name, &var_ty, index, target.line)?
      }
      None => var_ty,
    };
    target.sym = Some(sym_id);
    target.ty = Some(ty.clone());
    Ok(ty)
  }

  /// `value` may be coerced in place to make it assignable to `to`.
  fn require_assignable(
    &mut self,
    value: &mut Expr,
    from: &Type,
    to: &Type,
    line: u32,
  ) -> CompileResult<()> {
    if from == to {
      return Ok(());
    }
    match (from, to) {
      // Widening int -> float and the int <-> bool pair are the only
      // assignment coercions; a float never narrows into an int.
      (Type::Int, Type::Float) | (Type::Int, Type::Bool) | (Type::Bool, Type::Int) => {
        coerce(value, to.clone());
        Ok(())
      }
      (Type::Array(_, from_len), Type::Array(_, to_len)) if from_len != to_len => {
        Err(CompileError::semantic(
          line,
          format!("array length mismatch: cannot assign {from} to {to}"),
        ))
      }
      _ => Err(CompileError::semantic(
        line,
        format!("type mismatch: cannot assign {from} to {to}"),
      )),
    }
  }

  // ----- Expressions -----

  fn check_expr(&mut self, expr: &mut Expr) -> CompileResult<Type> {
    let ty = match expr {
      Expr::Lit { value, .. } => match value {
        LitValue::Int(_) => Type::Int,
        LitValue::Float(_) => Type::Float,
        LitValue::Bool(_) => Type::Bool,
        LitValue::Str(_) => Type::Str,
      },
      Expr::Ref { name, sym, line, .. } => {
        let sym_id = self.resolve(name, *line)?;
        let symbol = self.table.symbol(sym_id);
        let Some(var_ty) = symbol.var_ty().cloned() else {
          return Err(CompileError::semantic(
            *line,
            format!("{name} is a procedure, not a variable"),
          ));
        };
        if symbol.param_direction() == Some(Direction::Out) {
          return Err(CompileError::semantic(
            *line,
            format!("cannot read from out parameter {name}"),
          ));
        }
        *sym = Some(sym_id);
        var_ty
      }
      Expr::Index {
        name,
        index,
        sym,
        line,
        ..
      } => {
        let sym_id = self.resolve(name, *line)?;
        let symbol = self.table.symbol(sym_id);
        let Some(var_ty) = symbol.var_ty().cloned() else {
          return Err(CompileError::semantic(
            *line,
            format!("{name} is a procedure, not a variable"),
          ));
        };
        *sym = Some(sym_id);
        let name = name.clone();
        let line = *line;
        self.check_index(&name, &var_ty, index.as_mut(), line)?
      }
      Expr::Unary {
        op: UnaryOp::Neg,
        operand,
        line,
        ..
      } => {
        let ty = self.check_expr(operand.as_mut())?;
        if !ty.is_numeric() {
          return Err(CompileError::semantic(
            *line,
            format!("operator '-' only valid on numbers, got {ty}"),
          ));
        }
        ty
      }
      Expr::Unary {
        op: UnaryOp::Not,
        operand,
        line,
        ..
      } => {
        let ty = self.check_expr(operand.as_mut())?;
        match ty {
          Type::Bool | Type::Int => ty,
          other => {
            return Err(CompileError::semantic(
              *line,
              format!("operator 'not' only valid on bool or int, got {other}"),
            ));
          }
        }
      }
      Expr::Binary {
        op,
        lhs,
        rhs,
        line,
        ..
      } => {
        let op = *op;
        let line = *line;
        let lhs_ty = self.check_expr(lhs.as_mut())?;
        let rhs_ty = self.check_expr(rhs.as_mut())?;
        self.check_binary(op, lhs.as_mut(), rhs.as_mut(), &lhs_ty, &rhs_ty, line)?
      }
      Expr::Call { .. } => {
        let ret = self.check_call(expr, false)?;
        return Ok(ret.expect("expression calls always have a return type"));
      }
      Expr::Cast { .. } => unreachable!("cast nodes are introduced by the checker"),
    };
    expr.set_ty(ty.clone());
    Ok(ty)
  }

  /// Operator typing with array broadcasting. Exactly one array operand
  /// broadcasts against a scalar; two array operands must have equal
  /// declared lengths. The element result follows the scalar rules.
  fn check_binary(
    &mut self,
    op: BinaryOp,
    lhs: &mut Expr,
    rhs: &mut Expr,
    lhs_ty: &Type,
    rhs_ty: &Type,
    line: u32,
  ) -> CompileResult<Type> {
    let broadcast_len = match (lhs_ty.array_len(), rhs_ty.array_len()) {
      (Some(a), Some(b)) if a == b => Some(a),
      (Some(a), Some(b)) => {
        return Err(CompileError::semantic(
          line,
          format!("array length mismatch: {a} vs {b} for operator '{}'", op.symbol()),
        ));
      }
      (Some(a), None) => Some(a),
      (None, Some(b)) => Some(b),
      (None, None) => None,
    };

    let left = lhs_ty.element().clone();
    let right = rhs_ty.element().clone();
    let elem = self.binary_element_type(op, lhs, rhs, left, right, line)?;

    Ok(match broadcast_len {
      Some(len) => Type::array_of(elem, len),
      None => elem,
    })
  }

  fn binary_element_type(
    &mut self,
    op: BinaryOp,
    lhs: &mut Expr,
    rhs: &mut Expr,
    left: Type,
    right: Type,
    line: u32,
  ) -> CompileResult<Type> {
    if op.is_arithmetic() {
      return match (&left, &right) {
        (Type::Int, Type::Int) => Ok(Type::Int),
        (Type::Float, Type::Float) => Ok(Type::Float),
        (Type::Int, Type::Float) => {
          coerce_element(lhs, Type::Float);
          Ok(Type::Float)
        }
        (Type::Float, Type::Int) => {
          coerce_element(rhs, Type::Float);
          Ok(Type::Float)
        }
        _ => Err(CompileError::semantic(
          line,
          format!(
            "operator '{}' only valid on numbers, got {left} and {right}",
            op.symbol()
          ),
        )),
      };
    }

    if op.is_comparison() {
      return match (&left, &right) {
        (Type::Int, Type::Int) | (Type::Float, Type::Float) => Ok(Type::Bool),
        (Type::Int, Type::Float) => {
          coerce_element(lhs, Type::Float);
          Ok(Type::Bool)
        }
        (Type::Float, Type::Int) => {
          coerce_element(rhs, Type::Float);
          Ok(Type::Bool)
        }
        (Type::Bool, Type::Bool) | (Type::Str, Type::Str)
          if matches!(op, BinaryOp::Eq | BinaryOp::Ne) =>
        {
          Ok(Type::Bool)
        }
        _ => Err(CompileError::semantic(
          line,
          format!(
            "operator '{}' not valid on {left} and {right}",
            op.symbol()
          ),
        )),
      };
    }

    // Logical: bitwise on ints, logical on bools; a mixed int operand is
    // coerced to bool and validated at runtime.
    match (&left, &right) {
      (Type::Int, Type::Int) => Ok(Type::Int),
      (Type::Bool, Type::Bool) => Ok(Type::Bool),
      (Type::Int, Type::Bool) => {
        coerce_element(lhs, Type::Bool);
        Ok(Type::Bool)
      }
      (Type::Bool, Type::Int) => {
        coerce_element(rhs, Type::Bool);
        Ok(Type::Bool)
      }
      _ => Err(CompileError::semantic(
        line,
        format!(
          "operator '{}' only valid on int or bool operands, got {left} and {right}",
          op.symbol()
        ),
      )),
    }
  }

  /// Resolve and check a call. `statement_position` permits void
  /// procedures; in expression position a return type is required.
  fn check_call(&mut self, call: &mut Expr, statement_position: bool) -> CompileResult<Option<Type>> {
    let Expr::Call {
      name,
      args,
      sym,
      ty,
      line,
    } = call
    else {
      unreachable!("check_call takes call nodes only");
    };
    let line = *line;

    let sym_id = self.resolve(name, line)?;
    let symbol = self.table.symbol(sym_id);
    let SymbolKind::Proc(sig) = &symbol.kind else {
      return Err(CompileError::semantic(
        line,
        format!("{name} is not a procedure"),
      ));
    };
    let sig = sig.clone();

    if args.len() != sig.params.len() {
      return Err(CompileError::semantic(
        line,
        format!(
          "procedure {name} takes {} arguments ({} given)",
          sig.params.len(),
          args.len()
        ),
      ));
    }

    for (arg, (param_ty, direction)) in args.iter_mut().zip(&sig.params) {
      match direction {
        Direction::Out => self.check_out_argument(arg, param_ty)?,
        Direction::In => {
          let arg_ty = self.check_expr(arg)?;
          let arg_line = arg.line();
          self.require_assignable(arg, &arg_ty, param_ty, arg_line)?;
        }
      }
    }

    if !statement_position && sig.ret.is_none() {
      return Err(CompileError::semantic(
        line,
        format!("procedure {name} does not return a value"),
      ));
    }

    *sym = Some(sym_id);
    *ty = sig.ret.clone();
    Ok(sig.ret)
  }

  /// An out argument must be an l-value of exactly the parameter's type.
  /// Reading restrictions do not apply: forwarding an enclosing `out`
  /// parameter is legal.
  fn check_out_argument(&mut self, arg: &mut Expr, param_ty: &Type) -> CompileResult<()> {
    let arg_ty = match arg {
      Expr::Ref { name, sym, ty, line } => {
        let sym_id = self.resolve(name, *line)?;
        let symbol = self.table.symbol(sym_id);
        let Some(var_ty) = symbol.var_ty().cloned() else {
          return Err(CompileError::semantic(
            *line,
            format!("{name} is a procedure, not a variable"),
          ));
        };
        *sym = Some(sym_id);
        *ty = Some(var_ty.clone());
        var_ty
      }
      Expr::Index {
        name,
        index,
        sym,
        ty,
        line,
      } => {
        let sym_id = self.resolve(name, *line)?;
        let symbol = self.table.symbol(sym_id);
        let Some(var_ty) = symbol.var_ty().cloned() else {
          return Err(CompileError::semantic(
            *line,
            format!("{name} is a procedure, not a variable"),
          ));
        };
        *sym = Some(sym_id);
        let name = name.clone();
        let line = *line;
        let elem = self.check_index(&name, &var_ty, index.as_mut(), line)?;
        *ty = Some(elem.clone());
        elem
      }
      other => {
        return Err(CompileError::semantic(
          other.line(),
          "argument to an out parameter must be an l-value",
        ));
      }
    };

    if arg_ty != *param_ty {
      return Err(CompileError::semantic(
        arg.line(),
        format!("out argument type {arg_ty} does not match parameter type {param_ty}"),
      ));
    }
    Ok(())
  }

  /// Check an index expression against an array variable and return the
  /// element type. A literal index outside `[0, len)` is rejected here.
  fn check_index(
    &mut self,
    name: &str,
    var_ty: &Type,
    index: &mut Expr,
    line: u32,
  ) -> CompileResult<Type> {
    let Type::Array(elem, len) = var_ty else {
      return Err(CompileError::semantic(
        line,
        format!("{name} is not an array"),
      ));
    };
    let index_ty = self.check_expr(index)?;
    if index_ty != Type::Int {
      return Err(CompileError::semantic(
        index.line(),
        format!("array index must be int, got {index_ty}"),
      ));
    }
    let index_line = index.line();
    if let Expr::Lit {
      value: LitValue::Int(n),
      ..
    } = index
      && (*n < 0 || *n >= *len)
    {
      return Err(CompileError::semantic(
        index_line,
        format!("index {n} out of range for {name}[{len}]"),
      ));
    }
    Ok((**elem).clone())
  }

  fn resolve(&self, name: &str, line: u32) -> CompileResult<SymbolId> {
    self
      .table
      .lookup(name)
      .ok_or_else(|| CompileError::semantic(line, format!("undeclared identifier {name}")))
  }
}

fn signature(proc: &ProcDecl) -> ProcSig {
  ProcSig {
    params: proc
      .params
      .iter()
      .map(|param| (param.var.ty.clone(), param.direction))
      .collect(),
    ret: None,
    builtin: false,
  }
}

/// Wrap `expr` in a coercion node unless it already has the wanted type.
fn coerce(expr: &mut Expr, to: Type) {
  let from = expr
    .ty()
    .cloned()
    .expect("coercion requires a typed operand");
  if from == to {
    return;
  }
  let line = expr.line();
  let placeholder = Expr::bool_lit(false, line);
  let operand = std::mem::replace(expr, placeholder);
  *expr = Expr::Cast {
    operand: Box::new(operand),
    from,
    to,
    line,
  };
}

/// Element-wise coercion: scalars coerce directly, an array operand records
/// an array-to-array cast the emitter applies per element.
fn coerce_element(expr: &mut Expr, to_elem: Type) {
  let from = expr
    .ty()
    .cloned()
    .expect("coercion requires a typed operand");
  let to = match &from {
    Type::Array(_, len) => Type::array_of(to_elem, *len),
    _ => to_elem,
  };
  coerce(expr, to);
}
