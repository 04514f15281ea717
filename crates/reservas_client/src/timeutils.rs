//! Timestamp normalization against a channel's reference timezone.

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use thiserror::Error;

/// A timestamp that may or may not carry a timezone.
///
/// Callers rarely care about the channel's zone when asking for "Tuesday at
/// 19:00"; [`localize`] pins the moment down before any matching happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Moment {
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

impl From<NaiveDateTime> for Moment {
    fn from(dt: NaiveDateTime) -> Self {
        Moment::Naive(dt)
    }
}

impl From<DateTime<FixedOffset>> for Moment {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Moment::Aware(dt)
    }
}

impl From<DateTime<chrono::Utc>> for Moment {
    fn from(dt: DateTime<chrono::Utc>) -> Self {
        Moment::Aware(dt.fixed_offset())
    }
}

impl From<DateTime<chrono::Local>> for Moment {
    fn from(dt: DateTime<chrono::Local>) -> Self {
        Moment::Aware(dt.fixed_offset())
    }
}

impl From<DateTime<Tz>> for Moment {
    fn from(dt: DateTime<Tz>) -> Self {
        Moment::Aware(dt.fixed_offset())
    }
}

/// A naive wall-clock time that was skipped by a forward clock jump and has
/// no representation in the target timezone.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{naive} does not exist on the clock of {tz}")]
pub struct NonexistentLocalTime {
    pub naive: NaiveDateTime,
    pub tz: Tz,
}

/// Localize `moment` to `tz`: an aware moment is converted, a naive one gets
/// the zone attached. A naive moment that falls in a backward clock jump is
/// resolved to its earliest occurrence.
pub fn localize(moment: Moment, tz: Tz) -> Result<DateTime<Tz>, NonexistentLocalTime> {
    match moment {
        Moment::Aware(dt) => Ok(dt.with_timezone(&tz)),
        Moment::Naive(naive) => match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Ok(dt),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest),
            LocalResult::None => Err(NonexistentLocalTime { naive, tz }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    const MVD: Tz = chrono_tz::America::Montevideo;

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn naive_moment_gets_zone_attached() {
        let localized = localize(naive(2025, 3, 10, 10, 0).into(), MVD).unwrap();
        assert_eq!(localized.naive_local(), naive(2025, 3, 10, 10, 0));
        assert_eq!(localized.timezone(), MVD);
    }

    #[test]
    fn aware_moment_is_converted() {
        // Montevideo has been at UTC-3 year-round since 2015.
        let utc = Utc.from_utc_datetime(&naive(2025, 3, 10, 13, 0));
        let localized = localize(utc.into(), MVD).unwrap();
        assert_eq!(localized.naive_local(), naive(2025, 3, 10, 10, 0));
    }

    #[test]
    fn conversion_preserves_the_instant() {
        let utc = Utc.from_utc_datetime(&naive(2025, 3, 10, 13, 0));
        let localized = localize(utc.into(), MVD).unwrap();
        assert_eq!(localized, utc);
    }

    #[test]
    fn skipped_wall_clock_time_is_an_error() {
        // Montevideo sprang forward from 02:00 to 03:00 on 2014-10-05; 02:30
        // never happened that day.
        let gap = naive(2014, 10, 5, 2, 30);
        let err = localize(gap.into(), MVD).unwrap_err();
        assert_eq!(err.naive, gap);
        assert!(err.to_string().contains("America/Montevideo"));
    }

    #[test]
    fn ambiguous_wall_clock_time_picks_the_earliest() {
        // Clocks fell back from 02:00 to 01:00 on 2015-03-08; 01:30 occurred
        // twice and the earlier instant (still on summer time, UTC-2) wins.
        let repeated = naive(2015, 3, 8, 1, 30);
        let localized = localize(repeated.into(), MVD).unwrap();
        assert_eq!(
            localized.to_utc().naive_utc(),
            naive(2015, 3, 8, 3, 30)
        );
    }
}
