//! Fixed-point ledger values
//!
//! Token balances on a real chain are integers in the token's smallest
//! unit. `Value` keeps that integer magnitude together with its decimal
//! scale so that a balance read from an adapter can be written back
//! without float round-off.
//!
//! Two values only combine (add, subtract, compare) when their scales
//! match. Scaling by a plain number is always allowed. There is no
//! `Value × Value`: the product has no unit.
//!
//! CRITICAL: `magnitude == value × 10^scale` at all times.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Largest scale whose power of ten fits in an i128
pub const MAX_SCALE: u32 = 38;

/// Errors from fixed-point arithmetic
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("Cannot combine values with different scales: {left} and {right}")]
    ScaleMismatch { left: u32, right: u32 },

    #[error("Scale {0} exceeds the maximum of {MAX_SCALE}")]
    ScaleTooLarge(u32),

    #[error("Fixed-point arithmetic overflowed")]
    Overflow,

    #[error("Value is not a finite number")]
    NonFinite,

    #[error("Division by zero")]
    DivisionByZero,
}

/// A decimal-scaled integer balance
///
/// # Example
/// ```
/// use rebase_simulator_core::Value;
///
/// let a = Value::from_f64(1.5, 6).unwrap();
/// let b = Value::new(250_000, 6).unwrap();
/// assert_eq!(a.add(&b).unwrap().to_string(), "1.750000");
///
/// let wei = Value::new(1, 18).unwrap();
/// assert!(a.add(&wei).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    magnitude: i128,
    scale: u32,
}

fn ten_pow(scale: u32) -> Result<i128, ValueError> {
    if scale > MAX_SCALE {
        return Err(ValueError::ScaleTooLarge(scale));
    }
    10i128.checked_pow(scale).ok_or(ValueError::Overflow)
}

impl Value {
    /// Wrap a raw magnitude in smallest units
    pub fn new(magnitude: i128, scale: u32) -> Result<Self, ValueError> {
        ten_pow(scale)?;
        Ok(Self { magnitude, scale })
    }

    /// Zero at the given scale
    pub fn zero(scale: u32) -> Result<Self, ValueError> {
        Self::new(0, scale)
    }

    /// Convert a float amount, truncating toward zero at the given scale
    pub fn from_f64(amount: f64, scale: u32) -> Result<Self, ValueError> {
        if !amount.is_finite() {
            return Err(ValueError::NonFinite);
        }
        let unit = ten_pow(scale)? as f64;
        let scaled = (amount * unit).trunc();
        if !scaled.is_finite() || scaled.abs() >= i128::MAX as f64 {
            return Err(ValueError::Overflow);
        }
        Ok(Self {
            magnitude: scaled as i128,
            scale,
        })
    }

    /// Raw integer magnitude in smallest units
    pub fn magnitude(&self) -> i128 {
        self.magnitude
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude == 0
    }

    /// Lossy conversion for the floating-point core
    pub fn to_f64(&self) -> f64 {
        // scale was validated at construction
        let unit = 10f64.powi(self.scale as i32);
        self.magnitude as f64 / unit
    }

    fn check_scale(&self, other: &Value) -> Result<(), ValueError> {
        if self.scale != other.scale {
            return Err(ValueError::ScaleMismatch {
                left: self.scale,
                right: other.scale,
            });
        }
        Ok(())
    }

    pub fn add(&self, other: &Value) -> Result<Value, ValueError> {
        self.check_scale(other)?;
        let magnitude = self
            .magnitude
            .checked_add(other.magnitude)
            .ok_or(ValueError::Overflow)?;
        Ok(Value {
            magnitude,
            scale: self.scale,
        })
    }

    pub fn subtract(&self, other: &Value) -> Result<Value, ValueError> {
        self.check_scale(other)?;
        let magnitude = self
            .magnitude
            .checked_sub(other.magnitude)
            .ok_or(ValueError::Overflow)?;
        Ok(Value {
            magnitude,
            scale: self.scale,
        })
    }

    /// Order two values of the same scale
    pub fn compare(&self, other: &Value) -> Result<Ordering, ValueError> {
        self.check_scale(other)?;
        Ok(self.magnitude.cmp(&other.magnitude))
    }

    /// Multiply by a plain factor, truncating toward zero
    pub fn mul_scalar(&self, factor: f64) -> Result<Value, ValueError> {
        if !factor.is_finite() {
            return Err(ValueError::NonFinite);
        }
        let product = (self.magnitude as f64 * factor).trunc();
        if !product.is_finite() || product.abs() >= i128::MAX as f64 {
            return Err(ValueError::Overflow);
        }
        Ok(Value {
            magnitude: product as i128,
            scale: self.scale,
        })
    }

    /// Multiply by an integer factor without leaving integer arithmetic
    pub fn mul_int(&self, factor: i128) -> Result<Value, ValueError> {
        let magnitude = self
            .magnitude
            .checked_mul(factor)
            .ok_or(ValueError::Overflow)?;
        Ok(Value {
            magnitude,
            scale: self.scale,
        })
    }

    /// Floor-divide by an integer divisor
    pub fn div_int(&self, divisor: i128) -> Result<Value, ValueError> {
        if divisor == 0 {
            return Err(ValueError::DivisionByZero);
        }
        Ok(Value {
            magnitude: self.magnitude.div_euclid(divisor),
            scale: self.scale,
        })
    }

    /// Re-express at a different scale
    ///
    /// Narrowing floors toward negative infinity (smallest units that do
    /// not fit are dropped); widening is exact.
    pub fn scale_to(&self, new_scale: u32) -> Result<Value, ValueError> {
        let magnitude = match new_scale.cmp(&self.scale) {
            Ordering::Equal => self.magnitude,
            Ordering::Greater => {
                let factor = ten_pow(new_scale - self.scale)?;
                self.magnitude
                    .checked_mul(factor)
                    .ok_or(ValueError::Overflow)?
            }
            Ordering::Less => {
                ten_pow(new_scale)?;
                let factor = ten_pow(self.scale - new_scale)?;
                self.magnitude.div_euclid(factor)
            }
        };
        Ok(Value {
            magnitude,
            scale: new_scale,
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = 10u128.pow(self.scale);
        let abs = self.magnitude.unsigned_abs();
        let sign = if self.magnitude < 0 { "-" } else { "" };
        let whole = abs / unit;
        if self.scale == 0 {
            return write!(f, "{}{}", sign, whole);
        }
        let frac = abs % unit;
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            whole,
            frac,
            width = self.scale as usize
        )
    }
}
