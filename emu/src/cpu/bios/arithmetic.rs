//! Integer and fixed-point math services: `Div`, `Sqrt`, `ArcTan`,
//! `ArcTan2`.
//!
//! Angles use the firmware's 16-bit circle: `0x4000` is a quarter turn.
//! Tangents are signed 1.14 fixed point.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Division {
    pub quotient: i32,
    pub remainder: i32,
    pub absolute_quotient: u32,
}

/// Truncating division. Dividing by zero does not fault: the quotient is
/// ±1 and the remainder the numerator. `i32::MIN / -1` wraps.
#[must_use]
pub fn div(numerator: i32, denominator: i32) -> Division {
    if denominator == 0 {
        tracing::warn!("BIOS Div: {numerator} divided by zero");
        return Division {
            quotient: if numerator < 0 { -1 } else { 1 },
            remainder: numerator,
            absolute_quotient: 1,
        };
    }

    let quotient = numerator.wrapping_div(denominator);
    Division {
        quotient,
        remainder: numerator.wrapping_rem(denominator),
        absolute_quotient: quotient.unsigned_abs(),
    }
}

/// Integer square root, rounded down.
#[must_use]
pub fn sqrt(value: u32) -> u16 {
    let mut root = 0_u32;
    let mut remainder = value;
    let mut bit = 1_u32 << 30;
    while bit > remainder {
        bit >>= 2;
    }
    while bit != 0 {
        if remainder >= root + bit {
            remainder -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }
    root as u16
}

/// The firmware's arctangent polynomial. Returns the angle and the values
/// the routine leaves in r1 and r3.
#[must_use]
pub fn arc_tan(tangent: i32) -> (i16, i32, i32) {
    const COEFFICIENTS: [i32; 7] = [0x390, 0x91C, 0xFB6, 0x16AA, 0x2081, 0x3651, 0xA2F9];

    let square = -(tangent.wrapping_mul(tangent) >> 14);
    let mut b = (0xA9_i32.wrapping_mul(square) >> 14) + COEFFICIENTS[0];
    for coefficient in &COEFFICIENTS[1..] {
        b = (b.wrapping_mul(square) >> 14) + coefficient;
    }
    let angle = (tangent.wrapping_mul(b) >> 16) as i16;
    (angle, square, b)
}

/// Angle of the vector `(x, y)` over the full circle, built on
/// [`arc_tan`] octant by octant. Also returns the value the firmware leaves
/// in r1, which is only touched when the polynomial ran.
#[must_use]
pub fn arc_tan2(x: i32, y: i32) -> (u16, Option<i32>) {
    let mut square = None;
    let mut tan = |numerator: i32, denominator: i32| {
        let (angle, r1, _) = arc_tan(numerator.wrapping_shl(14).wrapping_div(denominator));
        square = Some(r1);
        i32::from(angle)
    };

    let angle = if y == 0 {
        if x >= 0 { 0 } else { 0x8000 }
    } else if x == 0 {
        if y >= 0 { 0x4000 } else { 0xC000 }
    } else if y >= 0 {
        if x >= 0 && x >= y {
            tan(y, x)
        } else if x < 0 && -x >= y {
            tan(y, x) + 0x8000
        } else {
            0x4000 - tan(x, y)
        }
    } else if x <= 0 && -x > -y {
        tan(y, x) + 0x8000
    } else if x > 0 && x >= -y {
        tan(y, x) + 0x1_0000
    } else {
        0xC000 - tan(x, y)
    };
    (angle as u16, square)
}

/// Floating-point replacement for [`arc_tan`].
#[must_use]
pub fn arc_tan_exact(tangent: i32) -> i16 {
    let radians = (f64::from(tangent) / f64::from(0x4000)).atan();
    (radians * f64::from(0x8000) / PI).round() as i16
}

/// Floating-point replacement for [`arc_tan2`].
#[must_use]
pub fn arc_tan2_exact(x: i32, y: i32) -> u16 {
    let turns = f64::from(y).atan2(f64::from(x)) / (2.0 * PI);
    let angle = (turns * f64::from(0x1_0000)).round() as i64;
    angle.rem_euclid(0x1_0000) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn division() {
        assert_eq!(
            div(10, 3),
            Division {
                quotient: 3,
                remainder: 1,
                absolute_quotient: 3
            }
        );
        assert_eq!(
            div(-7, 2),
            Division {
                quotient: -3,
                remainder: -1,
                absolute_quotient: 3
            }
        );
    }

    #[test]
    fn division_by_zero_returns_sentinel() {
        assert_eq!(
            div(-5, 0),
            Division {
                quotient: -1,
                remainder: -5,
                absolute_quotient: 1
            }
        );
        assert_eq!(div(5, 0).quotient, 1);
        assert_eq!(div(i32::MIN, -1).quotient, i32::MIN);
    }

    #[test]
    fn square_roots() {
        assert_eq!(sqrt(0), 0);
        assert_eq!(sqrt(15), 3);
        assert_eq!(sqrt(16), 4);
        assert_eq!(sqrt(u32::MAX), 0xFFFF);

        let mut rng = StdRng::seed_from_u64(0x5A75);
        for _ in 0..1000 {
            let value: u32 = rng.r#gen();
            let root = u64::from(sqrt(value));
            assert!(root * root <= u64::from(value));
            assert!((root + 1) * (root + 1) > u64::from(value));
        }
    }

    #[test]
    fn polynomial_arc_tan() {
        assert_eq!(arc_tan(0), (0, 0, 0xA2F9));
        assert_eq!(arc_tan(0x4000), (0x2000, -0x4000, 0x8000));
        assert_eq!(arc_tan(-0x4000).0, -0x2000);
        assert_eq!(arc_tan(0x2000), (0x12E4, -0x1000, 0x9720));
        assert_eq!(arc_tan(0x1000).0, 0x9FB);
    }

    #[test]
    fn polynomial_arc_tan2_octants() {
        assert_eq!(arc_tan2(0x100, 0x100).0, 0x2000);
        assert_eq!(arc_tan2(-0x100, 0x100).0, 0x6000);
        assert_eq!(arc_tan2(-0x100, -0x100).0, 0xA000);
        assert_eq!(arc_tan2(0x100, -0x100).0, 0xE000);
        assert_eq!(arc_tan2(0x100, 0x80).0, 0x12E4);
        assert_eq!(arc_tan2(3, -7).0, 0xD07F);
        assert_eq!(arc_tan2(-5, 2).0, 0x707F);
        assert_eq!(arc_tan2(5, 0).0, 0);
        assert_eq!(arc_tan2(-5, 0).0, 0x8000);
        assert_eq!(arc_tan2(0, -5).0, 0xC000);

        assert_eq!(arc_tan2(0x100, 0x80), (0x12E4, Some(-0x1000)));
        assert_eq!(arc_tan2(0x80, 0x100).1, Some(-0x1000));
        assert_eq!(arc_tan2(-5, 0).1, None);
    }

    // The two modes agree closely but not bit for bit.
    #[test]
    fn exact_mode_stays_near_polynomial() {
        assert_eq!(arc_tan_exact(0x4000), 0x2000);
        assert_eq!(arc_tan2_exact(-0x100, 0x100), 0x6000);
        for tangent in (-0x4000..=0x4000).step_by(0x100) {
            let drift = i32::from(arc_tan_exact(tangent)) - i32::from(arc_tan(tangent).0);
            assert!(drift.abs() <= 4, "tangent {tangent:#X} drifted by {drift}");
        }
    }
}
