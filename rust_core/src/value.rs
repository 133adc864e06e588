use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};
use crate::number::Number;

/// Largest NATURAL: every integer up to 2^53 widens to a double exactly.
pub const MAX_NATURAL: u64 = 1 << 53;

/// The fixed set of domains a graph value can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AtomicType {
    Boolean,
    Probability,
    Natural,
    Real,
    PosReal,
}

impl AtomicType {
    /// Check that `value`, read as a double, lies in this type's domain.
    pub fn check(self, value: f64) -> Result<()> {
        let ok = match self {
            AtomicType::Boolean => value == 0.0 || value == 1.0,
            AtomicType::Probability => (0.0..=1.0).contains(&value),
            AtomicType::Natural => {
                (0.0..=MAX_NATURAL as f64).contains(&value) && value.fract() == 0.0
            }
            AtomicType::Real => true,
            AtomicType::PosReal => value > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(GraphError::InvalidValue { ty: self, value })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AtomicType::Boolean => "BOOLEAN",
            AtomicType::Probability => "PROBABILITY",
            AtomicType::Natural => "NATURAL",
            AtomicType::Real => "REAL",
            AtomicType::PosReal => "POS_REAL",
        }
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Repr {
    Bool(bool),
    Natural(u64),
    Double(f64),
}

/// A tagged scalar whose stored representation is chosen by its tag.
///
/// Fields are private: every value is built through a validating
/// constructor, so a value that exists satisfies its tag's domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomicValue {
    ty: AtomicType,
    repr: Repr,
}

impl AtomicValue {
    /// Build a value of type `ty` from a double, failing if it is outside
    /// the domain. BOOLEAN accepts 0.0/1.0, NATURAL accepts non-negative
    /// integral doubles.
    pub fn new(ty: AtomicType, value: f64) -> Result<Self> {
        ty.check(value)?;
        let repr = match ty {
            AtomicType::Boolean => Repr::Bool(value == 1.0),
            AtomicType::Natural => Repr::Natural(value as u64),
            AtomicType::Probability | AtomicType::Real | AtomicType::PosReal => {
                Repr::Double(value)
            }
        };
        Ok(Self { ty, repr })
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            ty: AtomicType::Boolean,
            repr: Repr::Bool(value),
        }
    }

    /// Fails above [`MAX_NATURAL`], where the double reading would round.
    pub fn natural(value: u64) -> Result<Self> {
        if value > MAX_NATURAL {
            return Err(GraphError::InvalidValue {
                ty: AtomicType::Natural,
                value: value as f64,
            });
        }
        Ok(Self {
            ty: AtomicType::Natural,
            repr: Repr::Natural(value),
        })
    }

    /// REAL is unconstrained; non-finite values are not intercepted.
    pub fn real(value: f64) -> Self {
        Self {
            ty: AtomicType::Real,
            repr: Repr::Double(value),
        }
    }

    pub fn probability(value: f64) -> Result<Self> {
        Self::new(AtomicType::Probability, value)
    }

    pub fn pos_real(value: f64) -> Result<Self> {
        Self::new(AtomicType::PosReal, value)
    }

    pub fn ty(&self) -> AtomicType {
        self.ty
    }

    /// The value widened to a double (booleans become 0/1).
    pub fn as_double(&self) -> f64 {
        match self.repr {
            Repr::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Repr::Natural(n) => n as f64,
            Repr::Double(d) => d,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.repr {
            Repr::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_natural(&self) -> Option<u64> {
        match self.repr {
            Repr::Natural(n) => Some(n),
            _ => None,
        }
    }

    /// Lift into a generic numeric representation, keeping the tag.
    pub fn to_number<N: Number>(&self) -> TypedNumber<N> {
        TypedNumber {
            ty: self.ty,
            value: N::from_f64(self.as_double()),
        }
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr {
            Repr::Bool(b) => write!(f, "{}({})", self.ty, b),
            Repr::Natural(n) => write!(f, "{}({})", self.ty, n),
            Repr::Double(d) => write!(f, "{}({})", self.ty, d),
        }
    }
}

/// A type tag paired with a value in a generic numeric representation.
///
/// This is what flows through the evaluation context: the tag drives
/// operator dispatch, the number carries the value (and, for a dual
/// number, its derivative). Construction checks the double reading of the
/// value against the tag, exactly like [`AtomicValue::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct TypedNumber<N> {
    ty: AtomicType,
    value: N,
}

impl<N: Number> TypedNumber<N> {
    pub fn new(ty: AtomicType, value: N) -> Result<Self> {
        ty.check(value.as_double())?;
        Ok(Self { ty, value })
    }

    pub fn ty(&self) -> AtomicType {
        self.ty
    }

    pub fn value(&self) -> &N {
        &self.value
    }

    pub fn into_value(self) -> N {
        self.value
    }

    /// Collapse to a plain value, dropping any derivative information.
    pub fn to_atomic(&self) -> Result<AtomicValue> {
        AtomicValue::new(self.ty, self.value.as_double())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_domain_construction_fails_for_every_tag() {
        assert!(AtomicValue::new(AtomicType::Boolean, 0.5).is_err());
        assert!(AtomicValue::new(AtomicType::Probability, 1.0001).is_err());
        assert!(AtomicValue::new(AtomicType::Probability, -0.1).is_err());
        assert!(AtomicValue::new(AtomicType::Natural, -1.0).is_err());
        assert!(AtomicValue::new(AtomicType::Natural, 2.5).is_err());
        assert!(AtomicValue::new(AtomicType::Real, f64::NAN).is_ok());
        assert!(AtomicValue::new(AtomicType::PosReal, 0.0).is_err());
        assert!(AtomicValue::new(AtomicType::PosReal, -3.0).is_err());
        assert!(AtomicValue::probability(f64::NAN).is_err());
    }

    #[test]
    fn test_representation_follows_tag() {
        let b = AtomicValue::new(AtomicType::Boolean, 1.0).unwrap();
        assert_eq!(b.as_bool(), Some(true));
        assert_eq!(b.as_double(), 1.0);

        let n = AtomicValue::new(AtomicType::Natural, 7.0).unwrap();
        assert_eq!(n.as_natural(), Some(7));
        assert_eq!(n.as_bool(), None);

        let p = AtomicValue::probability(0.25).unwrap();
        assert_eq!(p.ty(), AtomicType::Probability);
        assert_eq!(p.as_double(), 0.25);
    }

    #[test]
    fn test_natural_must_widen_exactly() {
        let max = AtomicValue::new(AtomicType::Natural, MAX_NATURAL as f64).unwrap();
        assert_eq!(max.as_natural(), Some(MAX_NATURAL));
        assert_eq!(max.as_double(), MAX_NATURAL as f64);

        assert!(AtomicValue::new(AtomicType::Natural, 1e30).is_err());
        assert!(AtomicValue::new(AtomicType::Natural, f64::INFINITY).is_err());
        assert!(AtomicValue::new(AtomicType::Natural, f64::NAN).is_err());
        assert!(AtomicValue::natural(MAX_NATURAL + 1).is_err());
        assert!(AtomicValue::natural(u64::MAX).is_err());
    }

    #[test]
    fn test_error_names_type() {
        let err = AtomicValue::pos_real(-1.0).unwrap_err();
        assert_eq!(err.to_string(), "invalid value -1 for type POS_REAL");
    }

    #[test]
    fn test_typed_number_checks_domain() {
        assert!(TypedNumber::new(AtomicType::Probability, 2.0_f64).is_err());
        let t = TypedNumber::new(AtomicType::PosReal, 2.0_f64).unwrap();
        assert_eq!(t.to_atomic().unwrap(), AtomicValue::pos_real(2.0).unwrap());
    }
}
