//! The SRC type lattice.
//!
//! Types are a closed set: the four scalars plus fixed-length arrays of a
//! scalar element. Arrays never nest. Procedure signatures live in the
//! symbol table rather than here because procedures are not first-class
//! values in the language.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
  Int,
  Float,
  Bool,
  Str,
  Array(Box<Type>, i64),
}

impl Type {
  pub fn array_of(elem: Type, len: i64) -> Self {
    Self::Array(Box::new(elem), len)
  }

  pub fn is_int(&self) -> bool {
    matches!(self, Type::Int)
  }

  pub fn is_numeric(&self) -> bool {
    matches!(self, Type::Int | Type::Float)
  }

  pub fn is_scalar(&self) -> bool {
    !matches!(self, Type::Array(..))
  }

  pub fn is_array(&self) -> bool {
    matches!(self, Type::Array(..))
  }

  /// Element type of an array, or the type itself for scalars.
  pub fn element(&self) -> &Type {
    match self {
      Type::Array(elem, _) => elem,
      other => other,
    }
  }

  pub fn array_len(&self) -> Option<i64> {
    match self {
      Type::Array(_, len) => Some(*len),
      _ => None,
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Type::Int => write!(f, "int"),
      Type::Float => write!(f, "float"),
      Type::Bool => write!(f, "bool"),
      Type::Str => write!(f, "string"),
      Type::Array(elem, len) => write!(f, "{elem}[{len}]"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_names_match_source_keywords() {
    assert_eq!(Type::Int.to_string(), "int");
    assert_eq!(Type::Str.to_string(), "string");
    assert_eq!(Type::array_of(Type::Float, 4).to_string(), "float[4]");
  }

  #[test]
  fn element_sees_through_arrays() {
    let arr = Type::array_of(Type::Int, 8);
    assert_eq!(*arr.element(), Type::Int);
    assert_eq!(*Type::Bool.element(), Type::Bool);
    assert_eq!(arr.array_len(), Some(8));
    assert_eq!(Type::Bool.array_len(), None);
  }
}
