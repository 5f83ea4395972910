//! GPS time conversion
//!
//! GPS time counts seconds since 1980-01-06T00:00:00Z without leap seconds,
//! so it runs ahead of UTC by the number of leap seconds inserted since then.

use chrono::{DateTime, Duration, Utc};

/// GPS epoch as a Unix timestamp
pub const GPS_EPOCH_UNIX: i64 = 315_964_800;

/// Unix timestamps at which a leap second took effect after the GPS epoch
const LEAP_SECONDS_UNIX: [i64; 18] = [
    362_793_600,   // 1981-07-01
    394_329_600,   // 1982-07-01
    425_865_600,   // 1983-07-01
    489_024_000,   // 1985-07-01
    567_993_600,   // 1988-01-01
    631_152_000,   // 1990-01-01
    662_688_000,   // 1991-01-01
    709_948_800,   // 1992-07-01
    741_484_800,   // 1993-07-01
    773_020_800,   // 1994-07-01
    820_454_400,   // 1996-01-01
    867_715_200,   // 1997-07-01
    915_148_800,   // 1999-01-01
    1_136_073_600, // 2006-01-01
    1_230_768_000, // 2009-01-01
    1_341_100_800, // 2012-07-01
    1_435_708_800, // 2015-07-01
    1_483_228_800, // 2017-01-01
];

pub fn gps_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default() + Duration::seconds(GPS_EPOCH_UNIX)
}

/// Leap seconds between the GPS epoch and `t`
pub fn leap_seconds_at(t: DateTime<Utc>) -> i64 {
    let unix = t.timestamp();
    LEAP_SECONDS_UNIX.iter().filter(|&&leap| leap <= unix).count() as i64
}

/// Convert a UTC instant to time since the GPS epoch
pub fn to_gps(t: DateTime<Utc>) -> Duration {
    (t - gps_epoch()) + Duration::seconds(leap_seconds_at(t))
}

/// Convert time since the GPS epoch back to a UTC instant
pub fn from_gps(gps: Duration) -> DateTime<Utc> {
    let gps_secs = gps.num_seconds();
    let leaps = LEAP_SECONDS_UNIX
        .iter()
        .enumerate()
        .filter(|(i, &leap)| leap - GPS_EPOCH_UNIX + *i as i64 + 1 <= gps_secs)
        .count() as i64;
    gps_epoch() + gps - Duration::seconds(leaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_gps_epoch_is_zero() {
        let epoch = Utc.with_ymd_and_hms(1980, 1, 6, 0, 0, 0).unwrap();
        assert_eq!(gps_epoch(), epoch);
        assert_eq!(to_gps(epoch), Duration::zero());
    }

    #[test]
    fn test_current_leap_second_offset() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(leap_seconds_at(t), 18);
        assert_eq!(to_gps(t), (t - gps_epoch()) + Duration::seconds(18));
    }

    #[test]
    fn test_gps_roundtrip_across_leap_seconds() {
        for (y, m, d) in [(1981, 1, 1), (1999, 6, 30), (2016, 12, 31), (2025, 7, 4)] {
            let t = Utc.with_ymd_and_hms(y, m, d, 10, 20, 30).unwrap();
            assert_eq!(from_gps(to_gps(t)), t);
        }
    }
}
