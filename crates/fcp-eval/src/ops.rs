//! Operator application.
//!
//! Every operator works elementwise. Operands are simple values or arrays;
//! 0-d arrays and simple values act as scalars and combine with arrays of
//! any shape, while arrays of rank ≥ 1 must all share one shape. When every
//! operand is a scalar the result is a simple value.

use crate::array::{fmt_shape, NdArray};
use crate::error::{EvalError, EvalResult};
use crate::value::Value;
use fcp_types::ast::Operator;

pub fn apply(op: Operator, args: &[Value]) -> EvalResult<Value> {
    check_arity(op, args.len())?;
    let arrays = args
        .iter()
        .map(|arg| {
            arg.to_array().ok_or_else(|| {
                EvalError::type_error(format!(
                    "operator {op} cannot be applied to a {}",
                    arg.type_name()
                ))
            })
        })
        .collect::<EvalResult<Vec<_>>>()?;

    let mut shape: Option<&[usize]> = None;
    for array in arrays.iter().filter(|a| a.ndim() > 0) {
        match shape {
            None => shape = Some(array.shape()),
            Some(s) if s != array.shape() => {
                return Err(EvalError::shape(format!(
                    "operator {op} was given arrays of shapes {} and {}",
                    fmt_shape(s),
                    fmt_shape(array.shape())
                )));
            }
            Some(_) => {}
        }
    }

    let mut operands = vec![0.0; arrays.len()];
    let Some(shape) = shape else {
        for (slot, array) in operands.iter_mut().zip(&arrays) {
            *slot = array.data()[0];
        }
        return Ok(Value::Simple(scalar(op, &operands)));
    };

    let len: usize = shape.iter().product();
    let mut data = Vec::with_capacity(len);
    for i in 0..len {
        for (slot, array) in operands.iter_mut().zip(&arrays) {
            *slot = if array.ndim() == 0 {
                array.data()[0]
            } else {
                array.data()[i]
            };
        }
        data.push(scalar(op, &operands));
    }
    Ok(Value::array(NdArray::new(shape.to_vec(), data)?))
}

fn check_arity(op: Operator, count: usize) -> EvalResult<()> {
    use Operator::*;
    let ok = match op {
        Plus | Times | Max | Min | And | Or | Xor => count >= 1,
        Minus | Root | Log => count == 1 || count == 2,
        Divide | Power | Quotient | Rem | Eq | Neq | Lt | Gt | Leq | Geq => count == 2,
        _ => count == 1,
    };
    if ok {
        Ok(())
    } else {
        Err(EvalError::arity(format!(
            "operator {op} cannot take {count} operand(s)"
        )))
    }
}

fn truth(x: bool) -> f64 {
    if x {
        1.0
    } else {
        0.0
    }
}

/// Apply `op` to scalar operands whose count has been checked.
fn scalar(op: Operator, xs: &[f64]) -> f64 {
    use Operator::*;
    let x = xs[0];
    let y = xs.get(1).copied().unwrap_or(f64::NAN);
    match op {
        Plus => xs.iter().sum(),
        Times => xs.iter().product(),
        Max => xs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Min => xs.iter().copied().fold(f64::INFINITY, f64::min),
        And => truth(xs.iter().all(|&v| v != 0.0)),
        Or => truth(xs.iter().any(|&v| v != 0.0)),
        Xor => truth(xs.iter().filter(|&&v| v != 0.0).count() % 2 == 1),
        Minus if xs.len() == 1 => -x,
        Minus => x - y,
        Divide => x / y,
        Power => x.powf(y),
        Quotient => (x / y).trunc(),
        Rem => x % y,
        // Two-operand forms take the degree or base first.
        Root if xs.len() == 2 => y.powf(1.0 / x),
        Root => x.sqrt(),
        Log if xs.len() == 2 => y.log(x),
        Log => x.log10(),
        Eq => truth(x == y),
        Neq => truth(x != y),
        Lt => truth(x < y),
        Gt => truth(x > y),
        Leq => truth(x <= y),
        Geq => truth(x >= y),
        Not => truth(x == 0.0),
        Abs => x.abs(),
        Floor => x.floor(),
        Ceiling => x.ceil(),
        Exp => x.exp(),
        Ln => x.ln(),
        Sin => x.sin(),
        Cos => x.cos(),
        Tan => x.tan(),
        Sec => 1.0 / x.cos(),
        Csc => 1.0 / x.sin(),
        Cot => 1.0 / x.tan(),
        Sinh => x.sinh(),
        Cosh => x.cosh(),
        Tanh => x.tanh(),
        Sech => 1.0 / x.cosh(),
        Csch => 1.0 / x.sinh(),
        Coth => 1.0 / x.tanh(),
        Arcsin => x.asin(),
        Arccos => x.acos(),
        Arctan => x.atan(),
        Arccosh => x.acosh(),
        Arccot => (1.0 / x).atan(),
        Arccoth => (1.0 / x).atanh(),
        Arccsc => (1.0 / x).asin(),
        Arccsch => (1.0 / x).asinh(),
        Arcsec => (1.0 / x).acos(),
        Arcsech => (1.0 / x).acosh(),
        Arcsinh => x.asinh(),
        Arctanh => x.atanh(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;

    fn s(x: f64) -> Value {
        Value::Simple(x)
    }

    fn v(xs: &[f64]) -> Value {
        Value::array(NdArray::vector(xs.to_vec()))
    }

    #[test]
    fn test_scalar_arithmetic() {
        assert_eq!(apply(Operator::Plus, &[s(1.0), s(2.0), s(4.0)]).unwrap(), s(7.0));
        assert_eq!(apply(Operator::Power, &[s(2.0), s(3.0)]).unwrap(), s(8.0));
        assert_eq!(apply(Operator::Divide, &[s(1.0), s(2.0)]).unwrap(), s(0.5));
        assert_eq!(apply(Operator::Minus, &[s(3.0)]).unwrap(), s(-3.0));
        assert_eq!(apply(Operator::Quotient, &[s(-7.0), s(2.0)]).unwrap(), s(-3.0));
        assert_eq!(apply(Operator::Rem, &[s(7.0), s(3.0)]).unwrap(), s(1.0));
        assert_eq!(apply(Operator::Root, &[s(16.0)]).unwrap(), s(4.0));
        assert_eq!(apply(Operator::Ln, &[s(1.0)]).unwrap(), s(0.0));
        assert_eq!(apply(Operator::Log, &[s(2.0), s(8.0)]).unwrap(), s(3.0));
    }

    #[test]
    fn test_scalar_array_is_simple() {
        let zero_d = Value::array(NdArray::scalar(2.0));
        assert!(matches!(
            apply(Operator::Times, &[zero_d, s(3.0)]).unwrap(),
            Value::Simple(x) if x == 6.0
        ));
    }

    #[test]
    fn test_elementwise_with_broadcast_scalar() {
        assert_eq!(
            apply(Operator::Plus, &[v(&[1.0, 2.0]), s(10.0)]).unwrap(),
            v(&[11.0, 12.0])
        );
        assert_eq!(
            apply(Operator::Lt, &[v(&[1.0, 5.0]), v(&[2.0, 2.0])]).unwrap(),
            v(&[1.0, 0.0])
        );
    }

    #[test]
    fn test_shape_mismatch() {
        let err = apply(Operator::Plus, &[v(&[1.0, 2.0]), v(&[1.0])]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Shape);
    }

    #[test]
    fn test_wrong_operand_type_and_count() {
        let err = apply(Operator::Plus, &[s(1.0), Value::Null]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
        let err = apply(Operator::Divide, &[s(1.0)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arity);
    }

    #[test]
    fn test_logic() {
        assert_eq!(apply(Operator::And, &[s(1.0), s(2.0)]).unwrap(), s(1.0));
        assert_eq!(apply(Operator::Or, &[s(0.0), s(0.0)]).unwrap(), s(0.0));
        assert_eq!(apply(Operator::Xor, &[s(1.0), s(1.0), s(1.0)]).unwrap(), s(1.0));
        assert_eq!(apply(Operator::Not, &[s(0.0)]).unwrap(), s(1.0));
        assert_eq!(apply(Operator::Max, &[s(1.0), s(3.0), s(2.0)]).unwrap(), s(3.0));
    }
}
