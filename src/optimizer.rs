// File: src/optimizer.rs
//
// Optimization passes over lowered chunks.
// Folds unary, mingle and select operators whose operands are constants.
// Folding never hides a runtime error: a mingle whose operand is too wide
// is left alone so it still fails with E533 when executed.

use crate::ast::{Expr, LValue};
use crate::bytecode::{Chunk, Op};
use crate::runtime::eval::{mingle, select, unary, Value};

/// Main optimizer for lowered chunks
pub struct Optimizer {
    /// Statistics about optimizations performed
    pub stats: OptimizationStats,
}

/// Statistics tracking what optimizations were performed
#[derive(Debug, Default, Clone)]
pub struct OptimizationStats {
    pub constants_folded: usize,
    pub expressions_visited: usize,
}

fn as_constant(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Constant { value, wide } => Some(Value { bits: *value, wide: *wide }),
        _ => None,
    }
}

fn from_value(value: Value) -> Expr {
    Expr::Constant { value: value.bits, wide: value.wide }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Self { stats: OptimizationStats::default() }
    }

    /// Run all optimization passes on a chunk
    pub fn optimize(&mut self, chunk: &mut Chunk) {
        for insn in &mut chunk.instructions {
            self.fold_op(&mut insn.op);
        }
    }

    fn fold_op(&mut self, op: &mut Op) {
        match op {
            Op::Assign { target, expr } => {
                if let LValue::Element { subscripts, .. } = target {
                    subscripts.iter_mut().for_each(|e| self.fold(e));
                }
                self.fold(expr);
            }
            Op::Redimension { dimensions, .. } => dimensions.iter_mut().for_each(|e| self.fold(e)),
            Op::Resume(depth) | Op::Forget(depth) => self.fold(depth),
            Op::ReadOut(items) => items.iter_mut().for_each(|e| self.fold(e)),
            _ => {}
        }
    }

    /// Fold bottom-up in place.
    pub fn fold(&mut self, expr: &mut Expr) {
        self.stats.expressions_visited += 1;
        let folded = match expr {
            Expr::Unary { op, operand } => {
                self.fold(operand);
                as_constant(operand).map(|v| from_value(unary(*op, v)))
            }
            Expr::Mingle(left, right) => {
                self.fold(left);
                self.fold(right);
                match (as_constant(left), as_constant(right)) {
                    (Some(l), Some(r)) => mingle(l.bits, r.bits).ok().map(|bits| from_value(Value::wide(bits))),
                    _ => None,
                }
            }
            Expr::Select(left, right) => {
                self.fold(left);
                self.fold(right);
                match (as_constant(left), as_constant(right)) {
                    (Some(l), Some(r)) => Some(from_value(Value { bits: select(l.bits, r.bits), wide: r.wide })),
                    _ => None,
                }
            }
            Expr::Element { subscripts, .. } => {
                subscripts.iter_mut().for_each(|e| self.fold(e));
                None
            }
            _ => None,
        };

        if let Some(constant) = folded {
            *expr = constant;
            self.stats.constants_folded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{UnaryOp, Variable};
    use crate::bytecode::{Guard, Instruction};

    fn konst(value: u16) -> Box<Expr> {
        Box::new(Expr::constant(value))
    }

    #[test]
    fn test_folds_mingle_of_constants() {
        let mut expr = Expr::Mingle(konst(3), konst(0));
        let mut optimizer = Optimizer::new();
        optimizer.fold(&mut expr);
        assert_eq!(expr, Expr::Constant { value: 0b1010, wide: true });
        assert_eq!(optimizer.stats.constants_folded, 1);
    }

    #[test]
    fn test_folds_nested_select() {
        let mut expr = Expr::Select(Box::new(Expr::Mingle(konst(3), konst(0))), konst(10));
        let mut optimizer = Optimizer::new();
        optimizer.fold(&mut expr);
        assert_eq!(expr, Expr::Constant { value: 0b11, wide: false });
        assert_eq!(optimizer.stats.constants_folded, 2);
    }

    #[test]
    fn test_leaves_variables_alone() {
        let mut expr = Expr::Unary {
            op: UnaryOp::And,
            operand: Box::new(Expr::Var(Variable::spot(1))),
        };
        let before = expr.clone();
        let mut optimizer = Optimizer::new();
        optimizer.fold(&mut expr);
        assert_eq!(expr, before);
        assert_eq!(optimizer.stats.constants_folded, 0);
    }

    #[test]
    fn test_does_not_fold_overwide_mingle() {
        // the inner mingle folds to 0xFFFFFFFF, too wide to mingle again
        let mut expr = Expr::Mingle(Box::new(Expr::Mingle(konst(65535), konst(65535))), konst(1));
        let mut optimizer = Optimizer::new();
        optimizer.fold(&mut expr);
        assert!(matches!(expr, Expr::Mingle(..)));
        assert_eq!(optimizer.stats.constants_folded, 1);
    }

    #[test]
    fn test_optimize_chunk_folds_resume_depth() {
        let mut chunk = Chunk::new("t");
        chunk.emit(Instruction {
            op: Op::Resume(Expr::Select(konst(1), konst(1))),
            guard: Guard::default(),
            trapdoor: None,
            label: None,
            line: 1,
        });
        let mut optimizer = Optimizer::new();
        optimizer.optimize(&mut chunk);
        assert_eq!(chunk.instructions[0].op, Op::Resume(Expr::constant(1)));
    }
}
