use std::fmt;

use crate::graph::Op;
use crate::types::{DType, ShapeDim, TensorType};

/// High-level shape rule categories for graph operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRuleKind {
    /// Nullary constant: the type is carried by the op itself.
    Constant,
    /// Binary arithmetic: broadcasting is applied to operands.
    ElementwiseBinary,
    /// Binary comparison: broadcast like arithmetic, produce booleans.
    Compare,
    /// Single input forwarded unchanged (Enter, Exit, NextIteration, Identity).
    Passthrough,
    /// Boolean scalar forwarded as the loop predicate.
    LoopCond,
    /// Data plus boolean scalar predicate, two outputs of the data type.
    Switch,
    /// Select among inputs of one type; second output is the taken index.
    Merge,
}

/// Error kinds produced by the shape engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeErrorKind {
    /// Operator has no shape rule.
    UnknownOp,
    /// Wrong number of inputs for the rule.
    Arity { expected: usize, found: usize },
    /// Operand dtypes are incompatible with each other or with the rule.
    DTypeMismatch { expected: String, found: Vec<DType> },
    /// Rank requirement not met (e.g. predicates must be scalars).
    RankMismatch { expected: String, actual: Vec<ShapeDim> },
    /// Broadcasting failed for the given input shapes.
    BroadcastError { lhs: Vec<ShapeDim>, rhs: Vec<ShapeDim> },
}

/// Rich shape error containing the operator name and a structured kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
    pub op: String,
    pub kind: ShapeErrorKind,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ShapeErrorKind::UnknownOp => {
                write!(f, "shape rule not defined for op `{}`", self.op)
            }
            ShapeErrorKind::Arity { expected, found } => write!(
                f,
                "op `{}` expects {} input(s), got {}",
                self.op, expected, found
            ),
            ShapeErrorKind::DTypeMismatch { expected, found } => write!(
                f,
                "dtype mismatch for op `{}`: expected {}, got {:?}",
                self.op, expected, found
            ),
            ShapeErrorKind::RankMismatch { expected, actual } => write!(
                f,
                "rank mismatch for op `{}`: expected {}, got {:?}",
                self.op, expected, actual
            ),
            ShapeErrorKind::BroadcastError { lhs, rhs } => write!(
                f,
                "cannot broadcast shapes {:?} and {:?} for op `{}`",
                lhs, rhs, self.op
            ),
        }
    }
}

impl std::error::Error for ShapeError {}

/// Returns the shape rule kind for a graph operator.
pub fn rule_for_op(op: &Op) -> ShapeRuleKind {
    match op {
        Op::Const { .. } => ShapeRuleKind::Constant,
        Op::Add | Op::Sub | Op::Mul | Op::Div => ShapeRuleKind::ElementwiseBinary,
        Op::Less | Op::Greater => ShapeRuleKind::Compare,
        Op::Identity | Op::Enter { .. } | Op::Exit | Op::NextIteration => {
            ShapeRuleKind::Passthrough
        }
        Op::LoopCond => ShapeRuleKind::LoopCond,
        Op::Switch => ShapeRuleKind::Switch,
        Op::Merge => ShapeRuleKind::Merge,
    }
}

/// Compute the broadcasted shape for two input shapes following the
/// standard "numpy-style" broadcasting rules.
///
/// Shapes are aligned from the right; dimensions must be equal or 1,
/// otherwise broadcasting fails. Symbolic dimensions only match themselves
/// or a known 1.
pub fn broadcast_shapes(
    lhs: &[ShapeDim],
    rhs: &[ShapeDim],
) -> Result<Vec<ShapeDim>, ShapeErrorKind> {
    let one = ShapeDim::Known(1);
    let max_rank = lhs.len().max(rhs.len());
    let mut result = Vec::with_capacity(max_rank);
    for i in 0..max_rank {
        let a = lhs
            .len()
            .checked_sub(i + 1)
            .map_or(&one, |idx| &lhs[idx]);
        let b = rhs
            .len()
            .checked_sub(i + 1)
            .map_or(&one, |idx| &rhs[idx]);

        let dim = if a == b || *a == one {
            b.clone()
        } else if *b == one {
            a.clone()
        } else {
            return Err(ShapeErrorKind::BroadcastError {
                lhs: lhs.to_vec(),
                rhs: rhs.to_vec(),
            });
        };
        result.push(dim);
    }
    result.reverse();
    Ok(result)
}

/// Infer the output types of `op` given the types of its data inputs.
///
/// For a Merge only the inputs that already exist are passed; the
/// back-edge input is checked separately when it is attached.
pub fn infer_output_types(op: &Op, inputs: &[&TensorType]) -> Result<Vec<TensorType>, ShapeError> {
    let name = op.name();
    let err = |kind: ShapeErrorKind| ShapeError {
        op: name.to_string(),
        kind,
    };
    let expect_arity = |expected: usize| {
        if inputs.len() == expected {
            Ok(())
        } else {
            Err(err(ShapeErrorKind::Arity {
                expected,
                found: inputs.len(),
            }))
        }
    };

    match rule_for_op(op) {
        ShapeRuleKind::Constant => {
            expect_arity(0)?;
            match op {
                Op::Const { value, shape } => {
                    Ok(vec![TensorType::new(value.dtype(), shape.clone())])
                }
                _ => Err(err(ShapeErrorKind::UnknownOp)),
            }
        }
        ShapeRuleKind::ElementwiseBinary | ShapeRuleKind::Compare => {
            expect_arity(2)?;
            let (lhs, rhs) = (inputs[0], inputs[1]);
            if lhs.dtype != rhs.dtype || !lhs.dtype.is_numeric() {
                return Err(err(ShapeErrorKind::DTypeMismatch {
                    expected: "two numeric operands of one dtype".to_string(),
                    found: vec![lhs.dtype, rhs.dtype],
                }));
            }
            let shape = broadcast_shapes(&lhs.shape, &rhs.shape).map_err(err)?;
            let dtype = if matches!(rule_for_op(op), ShapeRuleKind::Compare) {
                DType::Bool
            } else {
                lhs.dtype
            };
            Ok(vec![TensorType::new(dtype, shape)])
        }
        ShapeRuleKind::Passthrough => {
            expect_arity(1)?;
            Ok(vec![inputs[0].clone()])
        }
        ShapeRuleKind::LoopCond => {
            expect_arity(1)?;
            check_predicate(inputs[0]).map_err(err)?;
            Ok(vec![inputs[0].clone()])
        }
        ShapeRuleKind::Switch => {
            expect_arity(2)?;
            check_predicate(inputs[1]).map_err(err)?;
            Ok(vec![inputs[0].clone(), inputs[0].clone()])
        }
        ShapeRuleKind::Merge => {
            let Some(first) = inputs.first() else {
                return Err(err(ShapeErrorKind::Arity {
                    expected: 1,
                    found: 0,
                }));
            };
            if let Some(other) = inputs.iter().find(|t| t.dtype != first.dtype) {
                return Err(err(ShapeErrorKind::DTypeMismatch {
                    expected: format!("all inputs of dtype {}", first.dtype),
                    found: vec![first.dtype, other.dtype],
                }));
            }
            Ok(vec![(*first).clone(), TensorType::scalar(DType::I32)])
        }
    }
}

fn check_predicate(pred: &TensorType) -> Result<(), ShapeErrorKind> {
    if pred.dtype != DType::Bool {
        return Err(ShapeErrorKind::DTypeMismatch {
            expected: "bool predicate".to_string(),
            found: vec![pred.dtype],
        });
    }
    if !pred.is_scalar() {
        return Err(ShapeErrorKind::RankMismatch {
            expected: "scalar predicate".to_string(),
            actual: pred.shape.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scalar;

    fn f32_of(dims: &[usize]) -> TensorType {
        TensorType::new(DType::F32, dims.iter().map(|d| ShapeDim::Known(*d)).collect())
    }

    #[test]
    fn broadcast_aligns_from_the_right() {
        let out = broadcast_shapes(
            &[ShapeDim::Known(4), ShapeDim::Known(1)],
            &[ShapeDim::Known(3)],
        )
        .unwrap();
        assert_eq!(out, vec![ShapeDim::Known(4), ShapeDim::Known(3)]);
    }

    #[test]
    fn broadcast_rejects_incompatible_dims() {
        let err = broadcast_shapes(&[ShapeDim::Known(2)], &[ShapeDim::Known(3)]).unwrap_err();
        assert!(matches!(err, ShapeErrorKind::BroadcastError { .. }));
    }

    #[test]
    fn symbolic_dims_broadcast_against_one() {
        let out = broadcast_shapes(&[ShapeDim::Sym("B")], &[ShapeDim::Known(1)]).unwrap();
        assert_eq!(out, vec![ShapeDim::Sym("B")]);
    }

    #[test]
    fn compare_produces_bool() {
        let a = f32_of(&[2]);
        let b = f32_of(&[]);
        let out = infer_output_types(&Op::Less, &[&a, &b]).unwrap();
        assert_eq!(out, vec![TensorType::new(DType::Bool, vec![ShapeDim::Known(2)])]);
    }

    #[test]
    fn arithmetic_rejects_mixed_dtypes() {
        let a = f32_of(&[]);
        let b = TensorType::scalar(DType::I32);
        let err = infer_output_types(&Op::Add, &[&a, &b]).unwrap_err();
        assert!(matches!(err.kind, ShapeErrorKind::DTypeMismatch { .. }));
        assert!(err.to_string().contains("Add"));
    }

    #[test]
    fn switch_requires_scalar_bool_predicate() {
        let data = f32_of(&[3]);
        let bad = TensorType::new(DType::Bool, vec![ShapeDim::Known(2)]);
        let err = infer_output_types(&Op::Switch, &[&data, &bad]).unwrap_err();
        assert!(matches!(err.kind, ShapeErrorKind::RankMismatch { .. }));

        let pred = TensorType::scalar(DType::Bool);
        let out = infer_output_types(&Op::Switch, &[&data, &pred]).unwrap();
        assert_eq!(out, vec![data.clone(), data]);
    }

    #[test]
    fn merge_reports_value_index() {
        let data = f32_of(&[]);
        let out = infer_output_types(&Op::Merge, &[&data]).unwrap();
        assert_eq!(out[1], TensorType::scalar(DType::I32));
    }

    #[test]
    fn const_takes_dtype_from_value() {
        let op = Op::Const {
            value: Scalar::Bool(true),
            shape: vec![ShapeDim::Known(2)],
        };
        let out = infer_output_types(&op, &[]).unwrap();
        assert_eq!(out, vec![TensorType::new(DType::Bool, vec![ShapeDim::Known(2)])]);
    }
}
