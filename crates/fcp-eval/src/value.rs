//! Runtime values.

use crate::array::NdArray;
use crate::env::Environment;
use crate::error::{EvalError, EvalResult};
use fcp_types::ast::{Block, Expr, Operator};
use fcp_types::SourceFile;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    Simple(f64),
    Array(Rc<NdArray>),
    Tuple(Vec<Value>),
    String(String),
    Null,
    /// The `default` sentinel: asks a callee to use a parameter's default.
    Default,
    Lambda(Rc<Closure>),
}

/// A function value: parameters, their defaults, a body and the
/// environment it was defined in.
#[derive(Debug)]
pub struct Closure {
    pub params: Vec<String>,
    /// One slot per parameter.
    pub defaults: Vec<Option<Value>>,
    pub body: ClosureBody,
    pub env: Environment,
    /// The file the body was written in, for error locations.
    pub source: Rc<SourceFile>,
}

#[derive(Debug)]
pub enum ClosureBody {
    Expr(Expr),
    Block(Block),
    /// `@N:op`: apply the operator to the arguments.
    Operator(Operator),
}

impl Value {
    pub fn array(array: NdArray) -> Value {
        Value::Array(Rc::new(array))
    }

    /// Short name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Simple(_) => "simple value",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
            Value::String(_) => "string",
            Value::Null => "null",
            Value::Default => "default",
            Value::Lambda(_) => "function",
        }
    }

    /// The number held by a simple value or a 0-d array.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Simple(x) => Some(*x),
            Value::Array(a) => a.as_scalar(),
            _ => None,
        }
    }

    pub fn expect_number(&self, what: &str) -> EvalResult<f64> {
        self.as_number().ok_or_else(|| {
            EvalError::type_error(format!(
                "{what} must be a simple value, not {}",
                self.type_name()
            ))
        })
    }

    /// Numeric values as arrays; a simple value is a 0-d array.
    pub fn to_array(&self) -> Option<Rc<NdArray>> {
        match self {
            Value::Simple(x) => Some(Rc::new(NdArray::scalar(*x))),
            Value::Array(a) => Some(Rc::clone(a)),
            _ => None,
        }
    }

    pub fn expect_array(&self, what: &str) -> EvalResult<Rc<NdArray>> {
        self.to_array().ok_or_else(|| {
            EvalError::type_error(format!("{what} must be an array, not {}", self.type_name()))
        })
    }

    /// Nonzero numbers are true.
    pub fn is_truthy(&self, what: &str) -> EvalResult<bool> {
        Ok(self.expect_number(what)? != 0.0)
    }

    /// Plain JSON rendering for run outputs. Functions and sentinels have
    /// no data and render as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        fn array_json(shape: &[usize], data: &[f64]) -> serde_json::Value {
            match shape.split_first() {
                None => number_json(data.first().copied().unwrap_or(f64::NAN)),
                Some((&n, rest)) => {
                    let chunk: usize = rest.iter().product();
                    serde_json::Value::Array(
                        (0..n)
                            .map(|i| array_json(rest, &data[i * chunk..(i + 1) * chunk]))
                            .collect(),
                    )
                }
            }
        }
        match self {
            Value::Simple(x) => number_json(*x),
            Value::Array(a) => array_json(a.shape(), a.data()),
            Value::Tuple(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Null | Value::Default | Value::Lambda(_) => serde_json::Value::Null,
        }
    }
}

/// JSON has no NaN or infinity; those become `null`.
fn number_json(x: f64) -> serde_json::Value {
    serde_json::Number::from_f64(x)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl PartialEq for Value {
    /// Structural equality. Functions are never equal.
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Null, Value::Null) | (Value::Default, Value::Default) => true,
            (Value::Lambda(_), _) | (_, Value::Lambda(_)) => false,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Simple(x) => write!(f, "{x}"),
            Value::Array(a) => write!(f, "{a}"),
            Value::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::String(s) => write!(f, "{s:?}"),
            Value::Null => f.write_str("null"),
            Value::Default => f.write_str("default"),
            Value::Lambda(closure) => write!(f, "<function of {}>", closure.params.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_and_scalar_array_are_interchangeable() {
        let zero_d = Value::array(NdArray::scalar(3.0));
        assert_eq!(zero_d.as_number(), Some(3.0));
        assert_eq!(zero_d, Value::Simple(3.0));
        assert_eq!(Value::Simple(3.0).to_array().unwrap().ndim(), 0);
    }

    #[test]
    fn test_truthiness_needs_a_number() {
        assert!(Value::Simple(2.0).is_truthy("condition").unwrap());
        assert!(!Value::Simple(0.0).is_truthy("condition").unwrap());
        let err = Value::String("x".into()).is_truthy("condition").unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Type);
    }

    #[test]
    fn test_display() {
        let v = Value::Tuple(vec![
            Value::Simple(1.5),
            Value::array(NdArray::vector(vec![1.0, 2.0])),
            Value::String("s".into()),
            Value::Null,
        ]);
        assert_eq!(v.to_string(), "(1.5, [1, 2], \"s\", null)");
        assert_eq!(Value::Tuple(vec![Value::Default]).to_string(), "(default,)");
    }

    #[test]
    fn test_json() {
        let v = Value::array(NdArray::new(vec![2, 1], vec![1.0, f64::NAN]).unwrap());
        assert_eq!(v.to_json(), serde_json::json!([[1.0], [null]]));
    }
}
