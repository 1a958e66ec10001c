//! Deterministic fixed-point numbers and vectors.
//!
//! All battle simulation uses fixed-point arithmetic so that two runs fed
//! the same commands produce bit-identical state on every platform.
//! Floating-point values only appear at the edges: decoding authored
//! data (RON/JSON) and encoding [`FrameData`](crate::frame::FrameData).

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Scalar used for every position, speed, hit point ratio and timer.
///
/// Signed 32.32: world coordinates up to ±2^31 with a resolution of 2^-32.
pub type Fixed = I32F32;

/// π in fixed-point.
pub const PI: Fixed = Fixed::from_bits(13_493_037_705);

/// 2π in fixed-point.
pub const TAU: Fixed = Fixed::from_bits(26_986_075_409);

/// π/2 in fixed-point.
pub const FRAC_PI_2: Fixed = Fixed::from_bits(6_746_518_852);

/// Values below this are treated as zero length (matches 1e-4 within
/// fixed precision).
pub const SMALL_NUMBER: Fixed = Fixed::from_bits(429_497);

/// World-space position, velocity or direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// `#[serde(with = "fixed_serde")]`: a [`Fixed`] as its raw `i64` bits, for
/// checkpoints that must restore exactly.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Write the raw bits.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Read the raw bits.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point numbers in authored data.
///
/// Reads and writes plain decimal numbers (`350.0`, `0.8`) so balance files
/// and JSON frames stay human readable. Conversion happens once at the
/// boundary; out-of-range or non-finite input is a deserialization error.
pub mod fixed_decimal {
    use super::Fixed;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_num::<f64>())
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| D::Error::custom(format!("number {value} out of fixed-point range")))
    }
}

/// Serde support for [`Vec2Fixed`] in authored data, as a decimal `(x, y)`
/// pair.
pub mod vec2_decimal {
    use super::{Fixed, Vec2Fixed};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a vector as a decimal pair.
    pub fn serialize<S>(value: &Vec2Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (value.x.to_num::<f64>(), value.y.to_num::<f64>()).serialize(serializer)
    }

    /// Deserialize a vector from a decimal pair.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec2Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (x, y) = <(f64, f64)>::deserialize(deserializer)?;
        let x = Fixed::checked_from_num(x)
            .ok_or_else(|| D::Error::custom(format!("x {x} out of fixed-point range")))?;
        let y = Fixed::checked_from_num(y)
            .ok_or_else(|| D::Error::custom(format!("y {y} out of fixed-point range")))?;
        Ok(Vec2Fixed::new(x, y))
    }
}

/// Serde support for `Option<Vec2Fixed>` in authored data.
pub mod option_vec2_decimal {
    use super::{Fixed, Vec2Fixed};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize an optional vector.
    pub fn serialize<S>(value: &Option<Vec2Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&(v.x.to_num::<f64>(), v.y.to_num::<f64>())),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional vector.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec2Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some((x, y)) = Option::<(f64, f64)>::deserialize(deserializer)? else {
            return Ok(None);
        };
        match (Fixed::checked_from_num(x), Fixed::checked_from_num(y)) {
            (Some(x), Some(y)) => Ok(Some(Vec2Fixed::new(x, y))),
            _ => Err(D::Error::custom(format!("({x}, {y}) out of fixed-point range"))),
        }
    }
}

impl Vec2Fixed {
    /// Vector from fixed components.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Unit vector along +X (default facing).
    pub const UNIT_X: Self = Self {
        x: Fixed::ONE,
        y: Fixed::ZERO,
    };

    /// Squared distance; compare against a squared radius to skip the sqrt.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Squared length.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.dot(self)
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product (positive when `other` is
    /// counter-clockwise from `self`).
    #[must_use]
    pub fn cross(self, other: Self) -> Fixed {
        self.x * other.y - self.y * other.x
    }

    /// Unit vector in the same direction; zero stays zero.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len_sq = self.dot(self);

        if len_sq == Fixed::ZERO {
            return Self::ZERO;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }

    /// Normalize, treating near-zero vectors as zero.
    #[must_use]
    pub fn safe_normalize(self) -> Self {
        if self.length_squared() < SMALL_NUMBER {
            return Self::ZERO;
        }
        self.normalize()
    }

    /// Perpendicular vector (rotated 90° counter-clockwise).
    #[must_use]
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Rotate by `angle` radians.
    #[must_use]
    pub fn rotate(self, angle: Fixed) -> Self {
        let c = fixed_cos(angle);
        let s = fixed_sin(angle);
        Self::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    /// Rotate by the angle of a unit direction vector (complex multiply).
    #[must_use]
    pub fn rotate_by(self, direction: Self) -> Self {
        Self::new(
            self.x * direction.x - self.y * direction.y,
            self.x * direction.y + self.y * direction.x,
        )
    }

    /// Unit vector at `angle` radians.
    #[must_use]
    pub fn from_angle(angle: Fixed) -> Self {
        Self::new(fixed_cos(angle), fixed_sin(angle))
    }

    /// Component-wise clamp into `[min, max]`.
    #[must_use]
    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self::new(self.x.clamp(min.x, max.x), self.y.clamp(min.y, max.y))
    }
}

/// Computes the square root of a non-negative fixed-point number.
///
/// Integer square root on the raw bits, so the result is exact to the last
/// fractional bit (truncated). Negative input yields zero.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    // sqrt(bits / 2^32) * 2^32 == sqrt(bits * 2^32)
    let scaled = (value.to_bits() as u128) << 32;
    let root = isqrt_u128(scaled);
    Fixed::from_bits(root as i64)
}

fn isqrt_u128(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// Deterministic sine of an angle in radians.
///
/// Range-reduces into `[-π/2, π/2]` and evaluates a Taylor polynomial to
/// the 11th power; error stays below 1e-7 over the whole circle.
#[must_use]
pub fn fixed_sin(angle: Fixed) -> Fixed {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a < -PI {
        a += TAU;
    }
    if a > FRAC_PI_2 {
        a = PI - a;
    } else if a < -FRAC_PI_2 {
        a = -PI - a;
    }

    let x2 = a * a;
    let one = Fixed::ONE;
    let mut term = one - x2 / Fixed::from_num(110);
    term = one - x2 / Fixed::from_num(72) * term;
    term = one - x2 / Fixed::from_num(42) * term;
    term = one - x2 / Fixed::from_num(20) * term;
    term = one - x2 / Fixed::from_num(6) * term;
    a * term
}

/// Deterministic cosine of an angle in radians.
#[must_use]
pub fn fixed_cos(angle: Fixed) -> Fixed {
    fixed_sin(angle + FRAC_PI_2)
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

impl std::ops::Mul<Fixed> for Vec2Fixed {
    type Output = Self;

    fn mul(self, rhs: Fixed) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::Div<Fixed> for Vec2Fixed {
    type Output = Self;

    fn div(self, rhs: Fixed) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::SubAssign for Vec2Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epsilon() -> Fixed {
        Fixed::from_num(1) / Fixed::from_num(10000)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(0));
        let b = Vec2Fixed::new(Fixed::from_num(0), Fixed::from_num(4));
        let dist_sq = a.distance_squared(b);
        // 3² + 4² = 25
        assert_eq!(dist_sq, Fixed::from_num(25));
        assert_eq!(a.distance(b), Fixed::from_num(5));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);

        let result1 = a * Fixed::from_num(7);
        let result2 = b * Fixed::from_num(7);
        assert_eq!(result1, result2);
    }

    #[test]
    fn test_fixed_sqrt_exact_squares() {
        assert_eq!(fixed_sqrt(Fixed::from_num(0)), Fixed::ZERO);
        assert_eq!(fixed_sqrt(Fixed::from_num(1)), Fixed::ONE);
        assert_eq!(fixed_sqrt(Fixed::from_num(144)), Fixed::from_num(12));
        assert_eq!(fixed_sqrt(Fixed::from_num(25_000_000)), Fixed::from_num(5000));
        assert_eq!(fixed_sqrt(Fixed::from_num(-4)), Fixed::ZERO);
    }

    #[test]
    fn test_vec2_dot_and_cross() {
        let a = Vec2Fixed::from_ints(2, 3);
        let b = Vec2Fixed::from_ints(4, -1);
        assert_eq!(a.dot(b), Fixed::from_num(5));
        assert_eq!(Vec2Fixed::UNIT_X.cross(Vec2Fixed::from_ints(0, 1)), Fixed::ONE);
    }

    #[test]
    fn test_vec2_normalize() {
        let v = Vec2Fixed::from_ints(3, 4);
        let norm = v.normalize();

        let len_sq = norm.dot(norm);
        let one = Fixed::from_num(1);
        assert!(
            (len_sq - one).abs() < epsilon(),
            "normalized vector length² should be ~1, got {:?}",
            len_sq
        );

        let ratio_diff = (norm.x * Fixed::from_num(4)) - (norm.y * Fixed::from_num(3));
        assert!(ratio_diff.abs() < epsilon(), "direction not preserved: {:?}", ratio_diff);
    }

    #[test]
    fn test_safe_normalize_tiny_vector_is_zero() {
        let tiny = Vec2Fixed::new(Fixed::from_bits(10), Fixed::ZERO);
        assert_eq!(tiny.safe_normalize(), Vec2Fixed::ZERO);
    }

    #[test]
    fn test_sin_cos_known_angles() {
        let cases = [
            (Fixed::ZERO, Fixed::ZERO, Fixed::ONE),
            (FRAC_PI_2, Fixed::ONE, Fixed::ZERO),
            (PI, Fixed::ZERO, -Fixed::ONE),
            (-FRAC_PI_2, -Fixed::ONE, Fixed::ZERO),
            (TAU + FRAC_PI_2, Fixed::ONE, Fixed::ZERO),
        ];
        for (angle, sin, cos) in cases {
            assert!((fixed_sin(angle) - sin).abs() < epsilon(), "sin({angle})");
            assert!((fixed_cos(angle) - cos).abs() < epsilon(), "cos({angle})");
        }
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let rotated = Vec2Fixed::UNIT_X.rotate(FRAC_PI_2);
        assert!(rotated.x.abs() < epsilon());
        assert!((rotated.y - Fixed::ONE).abs() < epsilon());

        let by_dir = Vec2Fixed::from_ints(0, 90).rotate_by(Vec2Fixed::from_ints(0, 1));
        assert_eq!(by_dir, Vec2Fixed::from_ints(-90, 0));
    }

    #[test]
    fn test_decimal_serde_roundtrip() {
        #[derive(Serialize, Deserialize)]
        struct Sample {
            #[serde(with = "fixed_decimal")]
            value: Fixed,
            #[serde(with = "vec2_decimal")]
            point: Vec2Fixed,
        }

        let sample: Sample = ron::from_str("(value: 0.75, point: (600.0, 1200.5))").unwrap();
        assert_eq!(sample.value, Fixed::from_num(0.75));
        assert_eq!(sample.point, Vec2Fixed::new(Fixed::from_num(600), Fixed::from_num(1200.5)));

        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"value":0.75,"point":[600.0,1200.5]}"#);
    }
}
