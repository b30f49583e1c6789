//! Exact decimal values
//!
//! ORC stores decimals as a scaled integer plus a scale. [`Decimal`] keeps the
//! same shape over an arbitrary-precision integer, and all conversions to and
//! from text go through [`scale_to_string`] so no floating point is involved.

use crate::{OrcError, Result};
use num::{BigInt, Integer, Signed, Zero};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// An arbitrary-precision decimal: `unscaled * 10^-scale`
#[derive(Debug, Clone)]
pub struct Decimal {
    unscaled: BigInt,
    scale: u32,
}

fn ten_pow(exp: u32) -> BigInt {
    num::pow(BigInt::from(10), exp as usize)
}

/// Render a scaled integer as decimal text.
///
/// The magnitude is written in base 10 and the point is inserted `scale`
/// digits from the right. When there are not more digits than `scale`, the
/// result gets a `0.` prefix and zero padding. The sign is handled separately.
pub fn scale_to_string(unscaled: &BigInt, scale: u32) -> String {
    let digits = unscaled.abs().to_string();
    let sign = if unscaled.is_negative() { "-" } else { "" };
    let scale = scale as usize;
    if scale == 0 {
        return format!("{}{}", sign, digits);
    }
    if digits.len() > scale {
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        format!("{}{}.{}", sign, int_part, frac_part)
    } else {
        format!("{}0.{}{}", sign, "0".repeat(scale - digits.len()), digits)
    }
}

impl Decimal {
    pub fn new<I: Into<BigInt>>(unscaled: I, scale: u32) -> Self {
        Self {
            unscaled: unscaled.into(),
            scale,
        }
    }

    pub fn unscaled(&self) -> &BigInt {
        &self.unscaled
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Number of significant digits in the unscaled value
    pub fn precision(&self) -> u32 {
        self.unscaled.abs().to_string().len() as u32
    }

    pub fn is_negative(&self) -> bool {
        self.unscaled.is_negative()
    }

    /// Change the scale, rounding half to even when digits are dropped
    pub fn rescale(&self, scale: u32) -> Decimal {
        match scale.cmp(&self.scale) {
            Ordering::Equal => self.clone(),
            Ordering::Greater => Decimal::new(&self.unscaled * ten_pow(scale - self.scale), scale),
            Ordering::Less => {
                let divisor = ten_pow(self.scale - scale);
                let (mut quotient, remainder) = self.unscaled.abs().div_rem(&divisor);
                let twice = &remainder + &remainder;
                if twice > divisor || (twice == divisor && quotient.is_odd()) {
                    quotient += 1u32;
                }
                if self.unscaled.is_negative() {
                    quotient = -quotient;
                }
                Decimal::new(quotient, scale)
            }
        }
    }

    /// Rescale to `scale` and check that the result fits in `precision` digits
    pub fn quantize(&self, precision: u32, scale: u32) -> Result<Decimal> {
        let scaled = self.rescale(scale);
        if precision > 0 && scaled.precision() > precision {
            return Err(OrcError::value(format!(
                "Value {} does not fit decimal({},{}) for decimal",
                self, precision, scale
            )));
        }
        Ok(scaled)
    }

    /// Same value with trailing fractional zeros removed
    pub fn normalized(&self) -> Decimal {
        let mut unscaled = self.unscaled.clone();
        let mut scale = self.scale;
        let ten = BigInt::from(10);
        while scale > 0 && !unscaled.is_zero() {
            let (q, r) = unscaled.div_rem(&ten);
            if !r.is_zero() {
                break;
            }
            unscaled = q;
            scale -= 1;
        }
        if unscaled.is_zero() {
            scale = 0;
        }
        Decimal::new(unscaled, scale)
    }

    /// Unscaled value as `i128`, when it fits
    pub fn to_i128(&self) -> Option<i128> {
        i128::try_from(&self.unscaled).ok()
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&scale_to_string(&self.unscaled, self.scale))
    }
}

impl FromStr for Decimal {
    type Err = OrcError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let (negative, body) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        let valid = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty()) || !valid(int_part) || !valid(frac_part)
        {
            return Err(OrcError::value(format!("Invalid decimal literal '{}'", s)));
        }
        let digits = format!("{}{}", int_part, frac_part);
        let mut unscaled: BigInt = digits
            .parse()
            .map_err(|_| OrcError::value(format!("Invalid decimal literal '{}'", s)))?;
        if negative {
            unscaled = -unscaled;
        }
        Ok(Decimal::new(unscaled, frac_part.len() as u32))
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        self.rescale(scale).unscaled.cmp(&other.rescale(scale).unscaled)
    }
}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let norm = self.normalized();
        norm.unscaled.hash(state);
        norm.scale.hash(state);
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal::new(value, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_to_string() {
        assert_eq!(scale_to_string(&BigInt::from(12345), 2), "123.45");
        assert_eq!(scale_to_string(&BigInt::from(5), 2), "0.05");
        assert_eq!(scale_to_string(&BigInt::from(-5), 2), "-0.05");
        assert_eq!(scale_to_string(&BigInt::from(100), 0), "100");
        assert_eq!(scale_to_string(&BigInt::from(42), 2), "0.42");
        assert_eq!(scale_to_string(&BigInt::from(0), 3), "0.000");
        assert_eq!(scale_to_string(&BigInt::from(-12345), 5), "-0.12345");
    }

    #[test]
    fn test_parse() {
        let d: Decimal = "-123.450".parse().unwrap();
        assert_eq!(d.unscaled(), &BigInt::from(-123450));
        assert_eq!(d.scale(), 3);
        assert_eq!(d.to_string(), "-123.450");

        let d: Decimal = ".5".parse().unwrap();
        assert_eq!(d.to_string(), "0.5");

        assert!("".parse::<Decimal>().is_err());
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
        assert!("-".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_numeric_equality() {
        let a: Decimal = "1.50".parse().unwrap();
        let b: Decimal = "1.5".parse().unwrap();
        assert_eq!(a, b);
        assert!(Decimal::new(-1, 0) < Decimal::new(5, 3));
        assert_eq!(Decimal::new(0, 4).normalized().scale(), 0);
    }

    #[test]
    fn test_rescale_half_even() {
        let cases = [
            ("2.345", 2, "2.34"),
            ("2.355", 2, "2.36"),
            ("2.3451", 2, "2.35"),
            ("-2.345", 2, "-2.34"),
            ("-2.355", 2, "-2.36"),
            ("0.5", 0, "0"),
            ("1.5", 0, "2"),
            ("3.1", 3, "3.100"),
        ];
        for (input, scale, expected) in cases {
            let d: Decimal = input.parse().unwrap();
            assert_eq!(d.rescale(scale).to_string(), expected, "rescale {}", input);
        }
    }

    #[test]
    fn test_quantize_checks_precision() {
        let d: Decimal = "1234.5".parse().unwrap();
        assert_eq!(d.quantize(6, 2).unwrap().to_string(), "1234.50");
        let err = d.quantize(5, 2).unwrap_err();
        assert!(matches!(err, OrcError::Value(_)));
        assert!(err.to_string().contains("for decimal"));
    }

    #[test]
    fn test_precision() {
        assert_eq!(Decimal::new(0, 0).precision(), 1);
        assert_eq!(Decimal::new(-99999, 2).precision(), 5);
    }
}
