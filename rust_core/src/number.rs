//! The numeric contract shared by plain and gradient-bearing evaluation.
//!
//! Distributions only need [`Number`]; unary operators additionally need
//! the elementary functions in [`Elementary`]. `f64` implements both, and
//! so does [`crate::autodiff::Dual`], which is how HMC gets its gradient
//! without any distribution or operator knowing about derivatives.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

pub trait Number:
    Clone
    + Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Lift a constant.
    fn from_f64(value: f64) -> Self;

    fn as_double(&self) -> f64;

    /// Natural logarithm.
    fn log(&self) -> Self;
}

pub trait Elementary: Number {
    fn exp(&self) -> Self;
    fn expm1(&self) -> Self;
    /// log(1 + e^x), stable for large |x|.
    fn log1pexp(&self) -> Self;
    /// 1 / (1 + e^-x).
    fn logistic(&self) -> Self;
    /// Standard normal CDF.
    fn phi(&self) -> Self;
}

impl Number for f64 {
    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn as_double(&self) -> f64 {
        *self
    }

    #[inline]
    fn log(&self) -> Self {
        self.ln()
    }
}

impl Elementary for f64 {
    #[inline]
    fn exp(&self) -> Self {
        f64::exp(*self)
    }

    #[inline]
    fn expm1(&self) -> Self {
        self.exp_m1()
    }

    #[inline]
    fn log1pexp(&self) -> Self {
        log1pexp(*self)
    }

    #[inline]
    fn logistic(&self) -> Self {
        logistic(*self)
    }

    #[inline]
    fn phi(&self) -> Self {
        phi(*self)
    }
}

pub fn log1pexp(x: f64) -> f64 {
    if x <= -37.0 {
        x.exp()
    } else if x <= 18.0 {
        x.exp().ln_1p()
    } else if x <= 33.3 {
        x + (-x).exp()
    } else {
        x
    }
}

pub fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

pub fn phi(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal density.
pub fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Error function, Abramowitz and Stegun 7.1.26 (about 1.5e-7 absolute).
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}
