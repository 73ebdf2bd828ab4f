//! Runtime values and the operation tables shared by the constant folder
//! and the interpreter.

use std::fmt;

use crate::ast::{BinOp, UnOp};
use crate::types::ValType;

/// Longest string, in chars, produced by concatenation.
pub const MAX_STR: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// A level, by index. Behaves as an int in arithmetic and comparisons.
    Level(usize),
}

/// A value operation that has no defined result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueFault {
    #[error("division by zero")]
    DivisionByZero,
    #[error("undefined operation {op} on {ty}")]
    Undefined { op: String, ty: &'static str },
    #[error("incompatible operands {left} {op} {right}")]
    Mismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },
}

impl Value {
    pub fn val_type(&self) -> ValType {
        match self {
            Value::Int(_) | Value::Level(_) => ValType::Int,
            Value::Float(_) => ValType::Float,
            Value::Bool(_) => ValType::Bool,
            Value::Str(_) => ValType::Str,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Level(i) => i64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Only `true` is truthy; every other value is false.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::Int(v) => *v == 0,
            Value::Float(v) => *v == 0.0,
            _ => false,
        }
    }

    /// Default value for a declared type.
    pub fn zero_of(ty: ValType) -> Option<Value> {
        match ty {
            ValType::Int => Some(Value::Int(0)),
            ValType::Float => Some(Value::Float(0.0)),
            ValType::Bool => Some(Value::Bool(false)),
            ValType::Str => Some(Value::Str(String::new())),
            ValType::Undef | ValType::Univ => None,
        }
    }

    pub fn binary(&self, op: BinOp, rhs: &Value) -> Result<Value, ValueFault> {
        let mismatch = || ValueFault::Mismatch {
            op: op.symbol().to_owned(),
            left: self.val_type().name(),
            right: rhs.val_type().name(),
        };
        match (self, rhs) {
            (Value::Float(a), Value::Float(b)) => float_op(*a, op, *b),
            (Value::Bool(a), Value::Bool(b)) => bool_op(*a, op, *b),
            (Value::Str(a), Value::Str(b)) => str_op(a, op, b),
            _ => match (self.as_int(), rhs.as_int()) {
                (Some(a), Some(b)) => int_op(a, op, b),
                _ => Err(mismatch()),
            },
        }
    }

    pub fn unary(&self, op: UnOp) -> Result<Value, ValueFault> {
        let undefined = || ValueFault::Undefined {
            op: op.symbol().to_owned(),
            ty: self.val_type().name(),
        };
        match (self, op) {
            (Value::Float(v), UnOp::Plus) => Ok(Value::Float(*v)),
            (Value::Float(v), UnOp::Neg) => Ok(Value::Float(-v)),
            (Value::Bool(b), UnOp::Not) => Ok(Value::Bool(!b)),
            (Value::Int(_) | Value::Level(_), _) => {
                let v = self.as_int().ok_or_else(undefined)?;
                match op {
                    UnOp::Plus => Ok(Value::Int(v)),
                    UnOp::Neg => Ok(Value::Int(v.wrapping_neg())),
                    UnOp::BitNot => Ok(Value::Int(!v)),
                    UnOp::Not => Err(undefined()),
                }
            }
            _ => Err(undefined()),
        }
    }
}

fn compare<T: PartialOrd>(a: T, op: BinOp, b: T) -> Option<bool> {
    Some(match op {
        BinOp::Eq => a == b,
        BinOp::Ne => a != b,
        BinOp::Lt => a < b,
        BinOp::Le => a <= b,
        BinOp::Gt => a > b,
        BinOp::Ge => a >= b,
        _ => return None,
    })
}

fn int_op(a: i64, op: BinOp, b: i64) -> Result<Value, ValueFault> {
    if let Some(r) = compare(a, op, b) {
        return Ok(Value::Bool(r));
    }
    let v = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div | BinOp::Mod if b == 0 => return Err(ValueFault::DivisionByZero),
        BinOp::Div => a.wrapping_div(b),
        BinOp::Mod => a.wrapping_rem(b),
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        _ => {
            return Err(ValueFault::Undefined {
                op: op.symbol().to_owned(),
                ty: "int",
            })
        }
    };
    Ok(Value::Int(v))
}

/// IEEE 754 semantics: comparisons involving NaN are false except `!=`.
fn float_op(a: f64, op: BinOp, b: f64) -> Result<Value, ValueFault> {
    if let Some(r) = compare(a, op, b) {
        return Ok(Value::Bool(r));
    }
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        _ => {
            return Err(ValueFault::Undefined {
                op: op.symbol().to_owned(),
                ty: "float",
            })
        }
    };
    Ok(Value::Float(v))
}

fn bool_op(a: bool, op: BinOp, b: bool) -> Result<Value, ValueFault> {
    if let Some(r) = compare(a as i64, op, b as i64) {
        return Ok(Value::Bool(r));
    }
    match op {
        BinOp::And => Ok(Value::Bool(a && b)),
        BinOp::Or => Ok(Value::Bool(a || b)),
        _ => Err(ValueFault::Undefined {
            op: op.symbol().to_owned(),
            ty: "bool",
        }),
    }
}

fn str_op(a: &str, op: BinOp, b: &str) -> Result<Value, ValueFault> {
    if let Some(r) = compare(a, op, b) {
        return Ok(Value::Bool(r));
    }
    if op != BinOp::Add {
        return Err(ValueFault::Undefined {
            op: op.symbol().to_owned(),
            ty: "string",
        });
    }
    let joined = format!("{}{}", a, b);
    if joined.chars().count() > MAX_STR {
        tracing::warn!(
            len = joined.chars().count(),
            "string too long, truncating to {} chars",
            MAX_STR
        );
        return Ok(Value::Str(joined.chars().take(MAX_STR).collect()));
    }
    Ok(Value::Str(joined))
}

/// Shortest round-trip representation of a float, in
/// exponent notation outside `[1e-4, 1e21)`.
pub fn format_float(v: f64) -> String {
    let abs = v.abs();
    if v.is_nan() {
        return "NaN".to_owned();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_owned();
    }
    if abs != 0.0 && !(1e-4..1e21).contains(&abs) {
        let s = format!("{:e}", v);
        if let Some((mantissa, exp)) = s.split_once('e') {
            if let Ok(exp) = exp.parse::<i32>() {
                let sign = if exp < 0 { '-' } else { '+' };
                return format!("{}e{}{:02}", mantissa, sign, exp.abs());
            }
        }
        return s;
    }
    format!("{}", v)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => f.write_str(&format_float(*v)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => f.write_str(s),
            Value::Level(i) => write!(f, "{}", i),
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_arithmetic_wraps() {
        let max = Value::Int(i64::MAX);
        assert_eq!(max.binary(BinOp::Add, &Value::Int(1)), Ok(Value::Int(i64::MIN)));
        assert_eq!(
            Value::Int(i64::MIN).binary(BinOp::Div, &Value::Int(-1)),
            Ok(Value::Int(i64::MIN))
        );
        assert_eq!(Value::Int(7).binary(BinOp::Mod, &Value::Int(3)), Ok(Value::Int(1)));
        assert_eq!(Value::Int(6).binary(BinOp::BitXor, &Value::Int(3)), Ok(Value::Int(5)));
    }

    #[test]
    fn division_by_zero_faults() {
        assert_eq!(
            Value::Int(5).binary(BinOp::Div, &Value::Int(0)),
            Err(ValueFault::DivisionByZero)
        );
        assert_eq!(
            Value::Int(5).binary(BinOp::Mod, &Value::Int(0)),
            Err(ValueFault::DivisionByZero)
        );
    }

    #[test]
    fn nan_comparisons_follow_ieee() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan.binary(BinOp::Eq, &nan), Ok(Value::Bool(false)));
        assert_eq!(nan.binary(BinOp::Ne, &nan), Ok(Value::Bool(true)));
        assert_eq!(nan.binary(BinOp::Lt, &Value::Float(1.0)), Ok(Value::Bool(false)));
    }

    #[test]
    fn levels_compare_as_ints() {
        assert_eq!(Value::Level(2).binary(BinOp::Gt, &Value::Level(1)), Ok(Value::Bool(true)));
        assert_eq!(Value::Level(2).binary(BinOp::Eq, &Value::Int(2)), Ok(Value::Bool(true)));
        assert_eq!(Value::Level(1).binary(BinOp::Add, &Value::Int(1)), Ok(Value::Int(2)));
    }

    #[test]
    fn bools_compare_as_ints() {
        let t = Value::Bool(true);
        let f = Value::Bool(false);
        assert_eq!(t.binary(BinOp::Gt, &f), Ok(Value::Bool(true)));
        assert_eq!(t.binary(BinOp::And, &f), Ok(Value::Bool(false)));
    }

    #[test]
    fn string_concat_truncates() {
        let a = Value::Str("x".repeat(MAX_STR));
        let r = a.binary(BinOp::Add, &Value::Str("yy".into())).unwrap();
        assert_eq!(r.as_str().map(|s| s.chars().count()), Some(MAX_STR));
        assert!(Value::Str("a".into()).binary(BinOp::Sub, &Value::Str("b".into())).is_err());
    }

    #[test]
    fn unary_ops() {
        assert_eq!(Value::Int(3).unary(UnOp::Neg), Ok(Value::Int(-3)));
        assert_eq!(Value::Int(0).unary(UnOp::BitNot), Ok(Value::Int(-1)));
        assert_eq!(Value::Float(1.5).unary(UnOp::Neg), Ok(Value::Float(-1.5)));
        assert!(Value::Str("a".into()).unary(UnOp::Neg).is_err());
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(3.0), "3");
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(1e21), "1e+21");
        assert_eq!(format_float(1e-7), "1e-07");
        assert_eq!(Value::Int(-4).to_string(), "-4");
    }
}
