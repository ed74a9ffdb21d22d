//! Arithmetic over GF(256) for fragment splitting.
//!
//! Elements are bytes, addition is XOR, and multiplication reduces modulo the
//! AES polynomial `x⁸ + x⁴ + x³ + x + 1`. Multiplication is branch-free on the
//! operand values.

use std::ops::{Add, Mul};
use zeroize::Zeroize;

/// An element of GF(256).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Zeroize)]
pub(crate) struct Gf256(u8);

impl Gf256 {
    pub(crate) const ZERO: Self = Gf256(0);
    pub(crate) const ONE: Self = Gf256(1);

    #[inline]
    pub(crate) fn new(value: u8) -> Self {
        Self(value)
    }

    #[inline]
    pub(crate) fn value(self) -> u8 {
        self.0
    }

    /// Multiplicative inverse, `None` for zero.
    ///
    /// Computed as `a²⁵⁴` by square-and-multiply.
    pub(crate) fn invert(self) -> Option<Self> {
        if self.0 == 0 {
            return None;
        }
        let mut result = Self::ONE;
        let mut base = self;
        let mut exponent = 254u8;
        while exponent > 0 {
            if exponent & 1 == 1 {
                result = result * base;
            }
            base = base * base;
            exponent >>= 1;
        }
        Some(result)
    }
}

impl Add for Gf256 {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)]
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl Mul for Gf256 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let mut a = self.0;
        let mut b = rhs.0;
        let mut product = 0u8;
        for _ in 0..8 {
            product ^= a & 0u8.wrapping_sub(b & 1);
            let carry = 0u8.wrapping_sub(a >> 7);
            a = (a << 1) ^ (0x1B & carry);
            b >>= 1;
        }
        Self(product)
    }
}

/// Evaluate `coefficients[0] + coefficients[1]·x + ...` by Horner's rule.
pub(crate) fn evaluate(coefficients: &[Gf256], x: Gf256) -> Gf256 {
    coefficients
        .iter()
        .rev()
        .fold(Gf256::ZERO, |acc, &c| acc * x + c)
}

/// Lagrange interpolation of the points at `x`.
///
/// Returns `None` when two points share an x coordinate.
pub(crate) fn interpolate(points: &[(Gf256, Gf256)], x: Gf256) -> Option<Gf256> {
    let mut acc = Gf256::ZERO;
    for (i, &(xi, yi)) in points.iter().enumerate() {
        let mut numerator = Gf256::ONE;
        let mut denominator = Gf256::ONE;
        for (j, &(xj, _)) in points.iter().enumerate() {
            if i != j {
                // subtraction is addition in characteristic two
                numerator = numerator * (x + xj);
                denominator = denominator * (xi + xj);
            }
        }
        acc = acc + yi * numerator * denominator.invert()?;
    }
    Some(acc)
}
