//! Forward-mode automatic differentiation.
//!
//! A [`Dual`] carries a value and its derivative along one seeded
//! direction. Evaluating the log-density over duals once per coordinate
//! yields the full gradient; the graph is small relative to the cost of a
//! tape, and every distribution and operator is already generic over
//! [`Number`], so nothing else has to change.

use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::error::Result;
use crate::number::{self, Elementary, Number};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual {
    pub value: f64,
    pub tangent: f64,
}

impl Dual {
    #[inline]
    pub fn new(value: f64, tangent: f64) -> Self {
        Self { value, tangent }
    }

    #[inline]
    pub fn constant(value: f64) -> Self {
        Self::new(value, 0.0)
    }

    /// A variable seeded with unit tangent.
    #[inline]
    pub fn variable(value: f64) -> Self {
        Self::new(value, 1.0)
    }
}

impl Add for Dual {
    type Output = Dual;
    #[inline]
    fn add(self, rhs: Dual) -> Dual {
        Dual::new(self.value + rhs.value, self.tangent + rhs.tangent)
    }
}

impl Sub for Dual {
    type Output = Dual;
    #[inline]
    fn sub(self, rhs: Dual) -> Dual {
        Dual::new(self.value - rhs.value, self.tangent - rhs.tangent)
    }
}

impl Mul for Dual {
    type Output = Dual;
    #[inline]
    fn mul(self, rhs: Dual) -> Dual {
        Dual::new(
            self.value * rhs.value,
            self.tangent * rhs.value + self.value * rhs.tangent,
        )
    }
}

impl Div for Dual {
    type Output = Dual;
    #[inline]
    fn div(self, rhs: Dual) -> Dual {
        Dual::new(
            self.value / rhs.value,
            (self.tangent * rhs.value - self.value * rhs.tangent) / (rhs.value * rhs.value),
        )
    }
}

impl Neg for Dual {
    type Output = Dual;
    #[inline]
    fn neg(self) -> Dual {
        Dual::new(-self.value, -self.tangent)
    }
}

impl Number for Dual {
    #[inline]
    fn from_f64(value: f64) -> Self {
        Dual::constant(value)
    }

    #[inline]
    fn as_double(&self) -> f64 {
        self.value
    }

    #[inline]
    fn log(&self) -> Self {
        Dual::new(self.value.ln(), self.tangent / self.value)
    }
}

impl Elementary for Dual {
    fn exp(&self) -> Self {
        let e = self.value.exp();
        Dual::new(e, self.tangent * e)
    }

    fn expm1(&self) -> Self {
        Dual::new(self.value.exp_m1(), self.tangent * self.value.exp())
    }

    fn log1pexp(&self) -> Self {
        // d/dx log(1 + e^x) = logistic(x)
        Dual::new(
            number::log1pexp(self.value),
            self.tangent * number::logistic(self.value),
        )
    }

    fn logistic(&self) -> Self {
        let s = number::logistic(self.value);
        Dual::new(s, self.tangent * s * (1.0 - s))
    }

    fn phi(&self) -> Self {
        Dual::new(
            number::phi(self.value),
            self.tangent * number::normal_pdf(self.value),
        )
    }
}

/// Value and gradient of `f` at `point`, one forward pass per coordinate.
///
/// Returns the value from the first pass (all passes agree on it); an
/// empty point evaluates `f` once with no seeded direction.
pub fn gradient<F>(point: &[f64], f: F) -> Result<(f64, Vec<f64>)>
where
    F: Fn(&[Dual]) -> Result<Dual>,
{
    let mut duals: Vec<Dual> = point.iter().map(|&x| Dual::constant(x)).collect();
    if duals.is_empty() {
        return Ok((f(&duals)?.value, Vec::new()));
    }

    let mut value = f64::NAN;
    let mut grad = Vec::with_capacity(point.len());
    for i in 0..duals.len() {
        duals[i].tangent = 1.0;
        let out = f(&duals)?;
        duals[i].tangent = 0.0;
        if i == 0 {
            value = out.value;
        }
        grad.push(out.tangent);
    }
    Ok((value, grad))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finite_diff(f: impl Fn(f64) -> f64, x: f64) -> f64 {
        let eps = 1e-6;
        (f(x + eps) - f(x - eps)) / (2.0 * eps)
    }

    #[test]
    fn test_elementary_derivatives_match_finite_differences() {
        let x = 0.7;
        let d = Dual::variable(x);
        assert!((Number::log(&d).tangent - finite_diff(f64::ln, x)).abs() < 1e-6);
        assert!((Elementary::exp(&d).tangent - finite_diff(f64::exp, x)).abs() < 1e-6);
        assert!((d.expm1().tangent - finite_diff(f64::exp_m1, x)).abs() < 1e-6);
        assert!((d.log1pexp().tangent - finite_diff(number::log1pexp, x)).abs() < 1e-6);
        assert!((d.logistic().tangent - finite_diff(number::logistic, x)).abs() < 1e-6);
        assert!((d.phi().tangent - finite_diff(number::phi, x)).abs() < 1e-5);
    }

    #[test]
    fn test_quotient_rule() {
        // f(x) = x / (1 + x^2)
        let x = Dual::variable(1.5);
        let f = x / (Dual::constant(1.0) + x * x);
        let expected = finite_diff(|x| x / (1.0 + x * x), 1.5);
        assert!((f.tangent - expected).abs() < 1e-8);
    }

    #[test]
    fn test_gradient_of_quadratic() {
        // f(a, b) = a^2 * b - b
        let (value, grad) = gradient(&[2.0, 3.0], |v| Ok(v[0] * v[0] * v[1] - v[1])).unwrap();
        assert_eq!(value, 9.0);
        assert!((grad[0] - 12.0).abs() < 1e-12);
        assert!((grad[1] - 3.0).abs() < 1e-12);
    }
}
