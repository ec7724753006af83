/*!
    Timestamp types for media timing.
*/

use crate::Rational;

/**
    Sentinel raw timestamp meaning "no value", matching the demuxer's
    convention. Only used where a timestamp must be stored in an atomic;
    structured types carry `Option<Pts>` instead.
*/
pub const NOPTS: i64 = i64::MIN;

/**
    Presentation timestamp in time_base units.

    This is the raw counter value from the media stream. It only becomes a
    wall-clock quantity when combined with the stream's time base, see
    [`StreamTiming::real_time_ms`](crate::StreamTiming::real_time_ms).
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pts(pub i64);

impl Pts {
    /**
        Interpret a raw demuxer timestamp, mapping the NOPTS sentinel to None.
    */
    #[inline]
    pub fn from_raw(raw: i64) -> Option<Self> {
        (raw != NOPTS).then_some(Self(raw))
    }

    /**
        Raw value for storage in an atomic, mapping None to the NOPTS sentinel.
    */
    #[inline]
    pub fn to_raw(value: Option<Self>) -> i64 {
        value.map_or(NOPTS, |pts| pts.0)
    }

    /**
        Milliseconds represented by this timestamp under the given time base.
    */
    #[inline]
    pub fn to_millis(self, time_base: Rational) -> i64 {
        (self.0 as f64 * 1000.0 * time_base.to_f64()) as i64
    }
}

impl From<i64> for Pts {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/**
    Duration in time_base units.

    Shares representation with [`Pts`] but denotes a span rather than a
    point in time. Packet durations of zero are valid (unknown duration).
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MediaDuration(pub i64);

impl MediaDuration {
    #[inline]
    pub fn to_millis(self, time_base: Rational) -> i64 {
        (self.0 as f64 * 1000.0 * time_base.to_f64()) as i64
    }
}

impl From<i64> for MediaDuration {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB_MS: Rational = Rational { num: 1, den: 1000 };
    const TB_TS: Rational = Rational { num: 1, den: 90000 };

    #[test]
    fn from_raw_maps_sentinel() {
        assert_eq!(Pts::from_raw(NOPTS), None);
        assert_eq!(Pts::from_raw(0), Some(Pts(0)));
        assert_eq!(Pts::from_raw(-5), Some(Pts(-5)));
    }

    #[test]
    fn to_raw_round_trips() {
        assert_eq!(Pts::to_raw(None), NOPTS);
        assert_eq!(Pts::from_raw(Pts::to_raw(Some(Pts(42)))), Some(Pts(42)));
    }

    #[test]
    fn millis_projection() {
        assert_eq!(Pts(1500).to_millis(TB_MS), 1500);
        assert_eq!(Pts(90000).to_millis(TB_TS), 1000);
        assert_eq!(MediaDuration(3003).to_millis(TB_TS), 33);
    }

    #[test]
    fn ordering() {
        assert!(Pts(100) < Pts(200));
        assert_eq!(Pts(7), Pts(7));
    }
}
