// File: src/runtime/eval.rs
//
// Expression evaluation and the bit-level operators.

use crate::ast::{Expr, UnaryOp, VarKind};
use crate::errors::{ErrorCode, IckError};
use crate::runtime::context::ExecutionContext;

/// An evaluated expression. `wide` values may use all 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub bits: u32,
    pub wide: bool,
}

impl Value {
    pub fn short(bits: u16) -> Self {
        Value { bits: bits as u32, wide: false }
    }

    pub fn wide(bits: u32) -> Self {
        Value { bits, wide: true }
    }
}

/// Interleave two 16-bit values: `left` takes the odd bit positions.
pub fn mingle(left: u32, right: u32) -> Result<u32, IckError> {
    if left > 0xFFFF || right > 0xFFFF {
        return Err(IckError::runtime(
            ErrorCode::E533,
            format!("(#{} $ #{})", left, right),
        ));
    }
    let mut result = 0u32;
    for bit in 0..16 {
        result |= ((left >> bit) & 1) << (2 * bit + 1);
        result |= ((right >> bit) & 1) << (2 * bit);
    }
    Ok(result)
}

/// Pack the bits of `value` found under the 1-bits of `mask` into the low end.
pub fn select(value: u32, mask: u32) -> u32 {
    let mut result = 0u32;
    let mut out = 0;
    for bit in 0..32 {
        if (mask >> bit) & 1 == 1 {
            result |= ((value >> bit) & 1) << out;
            out += 1;
        }
    }
    result
}

/// Combine each bit with its neighbour, cyclically, within the value's width.
pub fn unary(op: UnaryOp, value: Value) -> Value {
    let bits = if value.wide {
        let rotated = value.bits.rotate_right(1);
        match op {
            UnaryOp::And => value.bits & rotated,
            UnaryOp::Or => value.bits | rotated,
            UnaryOp::Xor => value.bits ^ rotated,
        }
    } else {
        let narrow = value.bits as u16;
        let rotated = narrow.rotate_right(1);
        (match op {
            UnaryOp::And => narrow & rotated,
            UnaryOp::Or => narrow | rotated,
            UnaryOp::Xor => narrow ^ rotated,
        }) as u32
    };
    Value { bits, wide: value.wide }
}

pub fn evaluate(expr: &Expr, ctx: &dyn ExecutionContext) -> Result<Value, IckError> {
    match expr {
        Expr::Constant { value, wide } => Ok(Value { bits: *value, wide: *wide }),
        Expr::Var(var) => Ok(Value {
            bits: ctx.read(*var)?,
            wide: var.kind == VarKind::TwoSpot,
        }),
        Expr::Element { array, subscripts: subs } => {
            let index = subscripts(subs, ctx)?;
            Ok(Value {
                bits: ctx.read_element(*array, &index)?,
                wide: array.kind == VarKind::Hybrid,
            })
        }
        Expr::Array(array) => Err(IckError::runtime(
            ErrorCode::E241,
            format!("({} used as a value)", array),
        )),
        Expr::Unary { op, operand } => Ok(unary(*op, evaluate(operand, ctx)?)),
        Expr::Mingle(left, right) => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            Ok(Value::wide(mingle(l.bits, r.bits)?))
        }
        Expr::Select(left, right) => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            Ok(Value { bits: select(l.bits, r.bits), wide: r.wide })
        }
    }
}

pub fn subscripts(exprs: &[Expr], ctx: &dyn ExecutionContext) -> Result<Vec<u32>, IckError> {
    exprs.iter().map(|e| evaluate(e, ctx).map(|v| v.bits)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Calculation, StatementKind, Variable};
    use crate::parser::parse_source;
    use crate::runtime::context::Store;

    fn expr_of(source: &str) -> Expr {
        match parse_source(source).remove(0).kind {
            StatementKind::Calculate(Calculation::Assign { expr, .. }) => expr,
            other => panic!("not an assignment: {:?}", other),
        }
    }

    #[test]
    fn test_mingle() {
        assert_eq!(mingle(0b11, 0b00).unwrap(), 0b1010);
        assert_eq!(mingle(0, 1).unwrap(), 1);
        assert_eq!(mingle(0xFFFF, 0xFFFF).unwrap(), 0xFFFF_FFFF);
        assert_eq!(mingle(0x10000, 0).unwrap_err().code, ErrorCode::E533);
    }

    #[test]
    fn test_select() {
        // #179~#201 is the manual's worked example
        assert_eq!(select(179, 201), 9);
        assert_eq!(select(0b1010, 0b1111), 0b1010);
        assert_eq!(select(0xFFFF_FFFF, 0), 0);
    }

    #[test]
    fn test_unary_widths() {
        assert_eq!(unary(UnaryOp::And, Value::short(1)).bits, 0);
        assert_eq!(unary(UnaryOp::Or, Value::short(1)).bits, 0x8001);
        assert_eq!(unary(UnaryOp::Or, Value::wide(1)).bits, 0x8000_0001);
        assert_eq!(unary(UnaryOp::Xor, Value::short(0b0110)).bits, 0b0101);
    }

    #[test]
    fn test_evaluate_with_store() {
        let mut store = Store::default();
        store.write(Variable::spot(1), 3).unwrap();
        let value = evaluate(&expr_of("DO .2 <- .1$#0"), &store).unwrap();
        assert_eq!(value, Value::wide(0b1010));
        let value = evaluate(&expr_of("DO .2 <- '.1$#0'~#10"), &store).unwrap();
        assert_eq!(value, Value::short(0b11));
    }

    #[test]
    fn test_bare_array_is_not_a_value() {
        let store = Store::default();
        let err = evaluate(&Expr::Array(Variable::tail(1)), &store).unwrap_err();
        assert_eq!(err.code, ErrorCode::E241);
    }
}
