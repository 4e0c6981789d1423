//! When a booking window opens.
//!
//! Passes become bookable a fixed number of days before the visit, at a fixed
//! wall-clock time in the site's timezone. The rule is evaluated with real
//! timezone data, so the UTC instant moves with daylight saving.

use crate::error::ScheduleError;
use chrono::offset::LocalResult;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Days before the visit, local opening time, and the timezone that time is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningRule {
    days_before: u64,
    open_at: NaiveTime,
    timezone: Tz,
}

impl Default for OpeningRule {
    /// 14 days before, 14:00 America/Los_Angeles.
    fn default() -> Self {
        Self {
            days_before: 14,
            open_at: NaiveTime::from_hms_opt(14, 0, 0).unwrap_or(NaiveTime::MIN),
            timezone: chrono_tz::America::Los_Angeles,
        }
    }
}

impl OpeningRule {
    /// Builds a rule from configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown timezone name or an hour past 23.
    pub fn new(days_before: u64, open_hour: u32, timezone: &str) -> Result<Self, ScheduleError> {
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone {
                timezone: timezone.to_string(),
            })?;
        let open_at = NaiveTime::from_hms_opt(open_hour, 0, 0)
            .ok_or(ScheduleError::InvalidOpeningTime { hour: open_hour })?;
        Ok(Self {
            days_before,
            open_at,
            timezone,
        })
    }

    #[must_use]
    pub const fn days_before(&self) -> u64 {
        self.days_before
    }

    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The instant booking opens for `target`.
    ///
    /// # Errors
    ///
    /// Returns `DateOutOfRange` if the opening date underflows the calendar.
    pub fn opens_at(&self, target: NaiveDate) -> Result<DateTime<Utc>, ScheduleError> {
        let day = target
            .checked_sub_days(Days::new(self.days_before))
            .ok_or_else(|| ScheduleError::DateOutOfRange {
                date: target.to_string(),
            })?;
        let local = day.and_time(self.open_at);
        self.resolve(local)
            .map(|at| at.with_timezone(&Utc))
            .ok_or_else(|| ScheduleError::DateOutOfRange {
                date: target.to_string(),
            })
    }

    /// Maps a local wall-clock time to an instant. Ambiguous times (clocks
    /// falling back) take the earlier instant; skipped times (clocks springing
    /// forward) move to the first valid instant after the gap.
    fn resolve(&self, local: NaiveDateTime) -> Option<DateTime<Tz>> {
        match self.timezone.from_local_datetime(&local) {
            LocalResult::Single(at) => Some(at),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => (1..=4).find_map(|hours| {
                self.timezone
                    .from_local_datetime(&(local + chrono::Duration::minutes(30 * hours)))
                    .earliest()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().expect("valid instant")
    }

    #[test]
    fn winter_target_opens_at_2pm_pst() {
        let rule = OpeningRule::default();
        assert_eq!(
            rule.opens_at(date(2025, 12, 1)).expect("opens"),
            utc(2025, 11, 17, 22)
        );
    }

    #[test]
    fn summer_target_opens_at_2pm_pdt() {
        let rule = OpeningRule::default();
        assert_eq!(
            rule.opens_at(date(2025, 7, 15)).expect("opens"),
            utc(2025, 7, 1, 21)
        );
    }

    #[test]
    fn opening_day_on_dst_transitions() {
        let rule = OpeningRule::default();
        // 2025-03-09: clocks spring forward at 02:00, 14:00 is already PDT.
        assert_eq!(
            rule.opens_at(date(2025, 3, 23)).expect("opens"),
            utc(2025, 3, 9, 21)
        );
        // 2025-11-02: clocks fall back at 02:00, 14:00 is already PST.
        assert_eq!(
            rule.opens_at(date(2025, 11, 16)).expect("opens"),
            utc(2025, 11, 2, 22)
        );
    }

    #[test]
    fn skipped_local_time_moves_past_gap() {
        let rule = OpeningRule::new(0, 2, "America/Los_Angeles").expect("rule");
        // 02:00 does not exist on 2025-03-09; 03:00 PDT is 10:00Z.
        assert_eq!(
            rule.opens_at(date(2025, 3, 9)).expect("opens"),
            Utc.with_ymd_and_hms(2025, 3, 9, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn custom_rule() {
        let rule = OpeningRule::new(7, 9, "Europe/London").expect("rule");
        assert_eq!(rule.days_before(), 7);
        assert_eq!(
            rule.opens_at(date(2025, 1, 8)).expect("opens"),
            utc(2025, 1, 1, 9)
        );
    }

    #[test]
    fn rejects_bad_configuration() {
        assert_eq!(
            OpeningRule::new(14, 14, "Pacific/Nowhere"),
            Err(ScheduleError::InvalidTimezone {
                timezone: "Pacific/Nowhere".to_string()
            })
        );
        assert_eq!(
            OpeningRule::new(14, 24, "UTC"),
            Err(ScheduleError::InvalidOpeningTime { hour: 24 })
        );
    }
}
