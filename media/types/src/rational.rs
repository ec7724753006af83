/*!
    Rational number type for time bases and frame rates.
*/

use std::fmt;

/**
    A rational number represented as a numerator and denominator.

    Used for stream time bases (e.g. 1/90000 for MPEG-TS) and frame rates
    (e.g. 30000/1001 for 29.97 fps).
*/
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /**
        Create a new rational number.

        # Panics

        Panics if `den` is zero.
    */
    #[inline]
    pub const fn new(num: i32, den: i32) -> Self {
        assert!(den != 0, "denominator cannot be zero");
        Self { num, den }
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /**
        Number of time-base ticks in one second, rounded.

        For a 1/90000 time base this is 90000. Used to turn second-based
        offsets (e.g. a ten-second seek step) into pts deltas.
    */
    #[inline]
    pub fn ticks_per_second(self) -> i64 {
        (1.0 / self.to_f64()).round() as i64
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self::new(num, den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_and_fields() {
        let r = Rational::new(1, 90000);
        assert_eq!(r.num, 1);
        assert_eq!(r.den, 90000);
    }

    #[test]
    #[should_panic(expected = "denominator cannot be zero")]
    fn zero_denominator_panics() {
        Rational::new(1, 0);
    }

    #[test]
    fn to_f64() {
        assert_eq!(Rational::new(1, 1000).to_f64(), 0.001);
        assert_eq!(Rational::new(30000, 1001).to_f64(), 30000.0 / 1001.0);
    }

    #[test]
    fn ticks_per_second() {
        assert_eq!(Rational::new(1, 90000).ticks_per_second(), 90000);
        assert_eq!(Rational::new(1, 1000).ticks_per_second(), 1000);
        // 1001/30000 inverts to ~29.97 ticks
        assert_eq!(Rational::new(1001, 30000).ticks_per_second(), 30);
    }

    #[test]
    fn from_tuple() {
        let r: Rational = (1, 48000).into();
        assert_eq!(r, Rational::new(1, 48000));
    }
}
