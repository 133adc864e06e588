//! Unary operators and their type rules.
//!
//! Each operator accepts an explicit allow-list of input tags and produces
//! a fixed result tag. The arithmetic is written once over [`Elementary`],
//! so the same code evaluates plain doubles and dual numbers. Every result
//! is built with [`TypedNumber::new`], which is where PROBABILITY and
//! POS_REAL results are boundary-checked.

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::graph::NodeId;
use crate::number::Elementary;
use crate::value::{AtomicType, AtomicValue, TypedNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Complement,
    ToReal,
    ToPosReal,
    Negate,
    Exp,
    Expm1,
    Log1pExp,
    Log,
    Phi,
    Logistic,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 10] = [
        UnaryOp::Complement,
        UnaryOp::ToReal,
        UnaryOp::ToPosReal,
        UnaryOp::Negate,
        UnaryOp::Exp,
        UnaryOp::Expm1,
        UnaryOp::Log1pExp,
        UnaryOp::Log,
        UnaryOp::Phi,
        UnaryOp::Logistic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Complement => "COMPLEMENT",
            UnaryOp::ToReal => "TO_REAL",
            UnaryOp::ToPosReal => "TO_POS_REAL",
            UnaryOp::Negate => "NEGATE",
            UnaryOp::Exp => "EXP",
            UnaryOp::Expm1 => "EXPM1",
            UnaryOp::Log1pExp => "LOG1PEXP",
            UnaryOp::Log => "LOG",
            UnaryOp::Phi => "PHI",
            UnaryOp::Logistic => "LOGISTIC",
        }
    }

    /// Result tag for an input tag, or `None` if the operator rejects it.
    pub fn result_type(self, input: AtomicType) -> Option<AtomicType> {
        use AtomicType::*;
        match (self, input) {
            (UnaryOp::Complement, Boolean | Probability) => Some(input),
            (UnaryOp::ToReal, Boolean | Natural | Probability | PosReal | Real) => Some(Real),
            (UnaryOp::ToPosReal, Boolean | Natural | Probability | PosReal) => Some(PosReal),
            (UnaryOp::Negate, Real) => Some(Real),
            (UnaryOp::Exp, Real | PosReal) => Some(PosReal),
            (UnaryOp::Expm1, Real | PosReal) => Some(input),
            (UnaryOp::Log1pExp, Real | PosReal) => Some(PosReal),
            (UnaryOp::Log, PosReal) => Some(Real),
            (UnaryOp::Phi | UnaryOp::Logistic, Real) => Some(Probability),
            _ => None,
        }
    }

    /// The tag a node of this operator declares when its input tag is not
    /// one the operator accepts. Evaluating such a node fails anyway.
    pub fn nominal_type(self) -> AtomicType {
        match self {
            UnaryOp::Complement | UnaryOp::Phi | UnaryOp::Logistic => AtomicType::Probability,
            UnaryOp::ToReal | UnaryOp::Negate | UnaryOp::Expm1 | UnaryOp::Log => AtomicType::Real,
            UnaryOp::ToPosReal | UnaryOp::Exp | UnaryOp::Log1pExp => AtomicType::PosReal,
        }
    }
}

/// Evaluate `op` at `node` over a generic numeric representation.
pub fn eval<N: Elementary>(
    op: UnaryOp,
    input: &TypedNumber<N>,
    node: NodeId,
) -> Result<TypedNumber<N>> {
    let ty = op
        .result_type(input.ty())
        .ok_or(GraphError::InvalidParentType {
            op: op.name(),
            parent: input.ty(),
            node: node.0,
        })?;
    let x = input.value();
    let value = match op {
        UnaryOp::Complement => N::from_f64(1.0) - x.clone(),
        UnaryOp::ToReal | UnaryOp::ToPosReal => x.clone(),
        UnaryOp::Negate => -x.clone(),
        UnaryOp::Exp => x.exp(),
        UnaryOp::Expm1 => x.expm1(),
        UnaryOp::Log1pExp => x.log1pexp(),
        UnaryOp::Log => x.log(),
        UnaryOp::Phi => x.phi(),
        UnaryOp::Logistic => x.logistic(),
    };
    TypedNumber::new(ty, value)
}

/// Evaluate `op` on a plain value.
pub fn eval_value(op: UnaryOp, input: &AtomicValue, node: NodeId) -> Result<AtomicValue> {
    eval::<f64>(op, &input.to_number(), node)?.to_atomic()
}

#[cfg(test)]
mod tests {
    use super::*;

    const AT: NodeId = NodeId(3);

    fn real(x: f64) -> AtomicValue {
        AtomicValue::real(x)
    }

    #[test]
    fn test_complement() {
        let t = eval_value(UnaryOp::Complement, &AtomicValue::boolean(true), AT).unwrap();
        assert_eq!(t.as_bool(), Some(false));
        let p = AtomicValue::probability(0.3).unwrap();
        let c = eval_value(UnaryOp::Complement, &p, AT).unwrap();
        assert_eq!(c.ty(), AtomicType::Probability);
        assert!((c.as_double() - 0.7).abs() < 1e-15);
        assert!(eval_value(UnaryOp::Complement, &real(0.3), AT).is_err());
    }

    #[test]
    fn test_widening() {
        let n = AtomicValue::natural(12).unwrap();
        assert_eq!(eval_value(UnaryOp::ToReal, &n, AT).unwrap(), real(12.0));
        let b = AtomicValue::boolean(true);
        assert_eq!(
            eval_value(UnaryOp::ToPosReal, &b, AT).unwrap(),
            AtomicValue::pos_real(1.0).unwrap()
        );
        let p = AtomicValue::probability(0.4).unwrap();
        assert_eq!(
            eval_value(UnaryOp::ToPosReal, &p, AT).unwrap(),
            AtomicValue::pos_real(0.4).unwrap()
        );
        assert!(eval_value(UnaryOp::ToPosReal, &real(1.0), AT).is_err());
    }

    #[test]
    fn test_to_pos_real_of_false_violates_domain() {
        let err = eval_value(UnaryOp::ToPosReal, &AtomicValue::boolean(false), AT).unwrap_err();
        assert!(matches!(err, GraphError::InvalidValue { ty: AtomicType::PosReal, .. }));
    }

    #[test]
    fn test_negate_accepts_only_real() {
        assert_eq!(eval_value(UnaryOp::Negate, &real(2.5), AT).unwrap(), real(-2.5));
        let pos = AtomicValue::pos_real(2.5).unwrap();
        assert!(eval_value(UnaryOp::Negate, &pos, AT).is_err());
    }

    #[test]
    fn test_exponentials() {
        let e = eval_value(UnaryOp::Exp, &real(1.0), AT).unwrap();
        assert_eq!(e.ty(), AtomicType::PosReal);
        assert!((e.as_double() - std::f64::consts::E).abs() < 1e-15);

        let m = eval_value(UnaryOp::Expm1, &real(-1.0), AT).unwrap();
        assert_eq!(m.ty(), AtomicType::Real);
        assert!(m.as_double() < 0.0);

        let l = eval_value(UnaryOp::Log1pExp, &real(100.0), AT).unwrap();
        assert_eq!(l.as_double(), 100.0);
    }

    #[test]
    fn test_log_rejects_non_positive_types() {
        let err = eval_value(UnaryOp::Log, &real(-1.0), AT).unwrap_err();
        assert_eq!(
            err,
            GraphError::InvalidParentType {
                op: "LOG",
                parent: AtomicType::Real,
                node: 3
            }
        );
        assert_eq!(
            err.to_string(),
            "invalid parent type REAL for LOG operator at node_id 3"
        );
    }

    #[test]
    fn test_phi_and_logistic_produce_probabilities() {
        for op in [UnaryOp::Phi, UnaryOp::Logistic] {
            for &x in &[-50.0, -1.0, 0.0, 2.0, 50.0] {
                let p = eval_value(op, &real(x), AT).unwrap();
                assert_eq!(p.ty(), AtomicType::Probability);
            }
            assert!(eval_value(op, &AtomicValue::pos_real(1.0).unwrap(), AT).is_err());
        }
    }

    #[test]
    fn test_declared_type_matches_evaluated_type() {
        let inputs = [
            AtomicValue::boolean(true),
            AtomicValue::probability(0.5).unwrap(),
            AtomicValue::natural(2).unwrap(),
            real(0.5),
            AtomicValue::pos_real(0.5).unwrap(),
        ];
        for op in UnaryOp::ALL {
            for input in &inputs {
                if let Some(declared) = op.result_type(input.ty()) {
                    let out = eval_value(op, input, AT).unwrap();
                    assert_eq!(out.ty(), declared, "{} on {}", op.name(), input);
                }
            }
        }
    }
}
