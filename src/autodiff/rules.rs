// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the MIND project (Machine Intelligence Native Design).

use crate::graph::{Op, Output};

use super::engine::GradientOps;
use super::engine::{as_invalid, AutodiffError};

pub(super) fn apply_rule(
    ops: &mut impl GradientOps,
    op: &Op,
    operands: &[Output],
    upstream: Output,
) -> Result<(), AutodiffError> {
    match op {
        Op::Const { .. } | Op::Less | Op::Greater => Ok(()),
        Op::Identity => {
            let [src] = unary(op, operands)?;
            if ops.wants(src) {
                ops.add_grad(src, upstream)?;
            }
            Ok(())
        }
        Op::Add => {
            let [lhs, rhs] = binary(op, operands)?;
            if ops.wants(lhs) {
                ops.add_grad(lhs, upstream)?;
            }
            if ops.wants(rhs) {
                ops.add_grad(rhs, upstream)?;
            }
            Ok(())
        }
        Op::Sub => {
            let [lhs, rhs] = binary(op, operands)?;
            if ops.wants(lhs) {
                ops.add_grad(lhs, upstream)?;
            }
            if ops.wants(rhs) {
                let neg_one = ops.add_scalar_like(upstream, -1.0)?;
                let rhs_contrib = ops.add_binop(Op::Mul, upstream, neg_one)?;
                ops.add_grad(rhs, rhs_contrib)?;
            }
            Ok(())
        }
        Op::Mul => {
            let [lhs, rhs] = binary(op, operands)?;
            if ops.wants(lhs) {
                let dlhs = ops.add_binop(Op::Mul, upstream, rhs)?;
                ops.add_grad(lhs, dlhs)?;
            }
            if ops.wants(rhs) {
                let drhs = ops.add_binop(Op::Mul, upstream, lhs)?;
                ops.add_grad(rhs, drhs)?;
            }
            Ok(())
        }
        Op::Div => {
            // d(a/b) = da / b - db * a / b^2
            let [lhs, rhs] = binary(op, operands)?;
            let scaled = ops.add_binop(Op::Div, upstream, rhs)?;
            if ops.wants(lhs) {
                ops.add_grad(lhs, scaled)?;
            }
            if ops.wants(rhs) {
                let quotient = ops.add_binop(Op::Div, lhs, rhs)?;
                let product = ops.add_binop(Op::Mul, scaled, quotient)?;
                let neg_one = ops.add_scalar_like(product, -1.0)?;
                let drhs = ops.add_binop(Op::Mul, product, neg_one)?;
                ops.add_grad(rhs, drhs)?;
            }
            Ok(())
        }
        Op::Enter { .. }
        | Op::Merge
        | Op::Switch
        | Op::LoopCond
        | Op::NextIteration
        | Op::Exit => Err(AutodiffError::UnsupportedOp { op: op.name() }),
    }
}

fn unary(op: &Op, operands: &[Output]) -> Result<[Output; 1], AutodiffError> {
    match operands {
        [src] => Ok([*src]),
        _ => Err(as_invalid(format!(
            "{} expects 1 operand, found {}",
            op.name(),
            operands.len()
        ))),
    }
}

fn binary(op: &Op, operands: &[Output]) -> Result<[Output; 2], AutodiffError> {
    match operands {
        [lhs, rhs] => Ok([*lhs, *rhs]),
        _ => Err(as_invalid(format!(
            "{} expects 2 operands, found {}",
            op.name(),
            operands.len()
        ))),
    }
}
