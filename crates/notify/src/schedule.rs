//! Zone-aware schedule arithmetic
//!
//! Payment dates are calendar dates that denote local midnight in the
//! subscription's IANA timezone. All reminder instants are derived from that
//! local midnight and only then converted to UTC, so the math stays correct
//! across daylight-saving transitions.

use chrono::{DateTime, Days, Duration, LocalResult, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{NotifyError, NotifyResult};

/// Billing cycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingCycle {
    Weekly,
    Monthly,
    Quarterly,
    Annually,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Weekly => "weekly",
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Annually => "annually",
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(BillingCycle::Weekly),
            "monthly" => Ok(BillingCycle::Monthly),
            "quarterly" => Ok(BillingCycle::Quarterly),
            "annually" => Ok(BillingCycle::Annually),
            other => Err(NotifyError::InvalidBillingCycle(other.to_string())),
        }
    }
}

/// How far before the payment's local midnight the reminder fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOffset {
    None,
    FifteenMinutes,
    OneHour,
    OneDay,
    OneWeek,
}

impl ReminderOffset {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderOffset::None => "none",
            ReminderOffset::FifteenMinutes => "15m",
            ReminderOffset::OneHour => "1h",
            ReminderOffset::OneDay => "1d",
            ReminderOffset::OneWeek => "1w",
        }
    }
}

impl std::fmt::Display for ReminderOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReminderOffset {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ReminderOffset::None),
            "15m" => Ok(ReminderOffset::FifteenMinutes),
            "1h" => Ok(ReminderOffset::OneHour),
            "1d" => Ok(ReminderOffset::OneDay),
            "1w" => Ok(ReminderOffset::OneWeek),
            other => Err(NotifyError::InvalidReminderOffset(other.to_string())),
        }
    }
}

/// Parse an IANA zone name (e.g. `America/New_York`)
pub fn parse_zone(name: &str) -> NotifyResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| NotifyError::InvalidTimezone(name.to_string()))
}

/// Resolve a calendar date to its local midnight in `tz`.
///
/// A midnight skipped by a DST gap resolves to the earliest valid instant
/// after the gap; an ambiguous midnight (fall-back) resolves to the earlier
/// of the two instants.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earlier, _later) => earlier,
        LocalResult::None => {
            // Midnight does not exist in this zone on this date (e.g.
            // America/Santiago spring-forward). Probe forward in 15-minute
            // steps until the gap ends; DST gaps are at most a few hours.
            let mut probe = naive;
            loop {
                probe += Duration::minutes(15);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt;
                }
            }
        }
    }
}

/// Compute the UTC instant a reminder is due: the payment date's local
/// midnight in `tz`, minus the reminder offset.
///
/// Day and week offsets are calendar-unit subtraction (they land on the
/// earlier date's local midnight); minute and hour offsets are exact
/// durations. Pure and deterministic.
pub fn scheduled_instant(payment_date: NaiveDate, tz: Tz, offset: ReminderOffset) -> DateTime<Utc> {
    match offset {
        ReminderOffset::None => local_midnight(payment_date, tz).with_timezone(&Utc),
        ReminderOffset::FifteenMinutes => {
            (local_midnight(payment_date, tz) - Duration::minutes(15)).with_timezone(&Utc)
        }
        ReminderOffset::OneHour => {
            (local_midnight(payment_date, tz) - Duration::hours(1)).with_timezone(&Utc)
        }
        ReminderOffset::OneDay => {
            local_midnight(payment_date - Duration::days(1), tz).with_timezone(&Utc)
        }
        ReminderOffset::OneWeek => {
            local_midnight(payment_date - Duration::days(7), tz).with_timezone(&Utc)
        }
    }
}

/// Advance a payment date by one billing-cycle unit.
///
/// Month and year steps follow standard calendar rules: the day-of-month is
/// clamped to the last valid day of the target month (Jan 31 + 1 month is
/// Feb 28 or 29, and the clamped day carries forward, matching the original
/// scheduler's arithmetic).
pub fn advance_date(date: NaiveDate, cycle: BillingCycle) -> NaiveDate {
    let advanced = match cycle {
        BillingCycle::Weekly => date.checked_add_days(Days::new(7)),
        BillingCycle::Monthly => date.checked_add_months(Months::new(1)),
        BillingCycle::Quarterly => date.checked_add_months(Months::new(3)),
        BillingCycle::Annually => date.checked_add_months(Months::new(12)),
    };
    // Overflow is only reachable near NaiveDate::MAX; saturating keeps the
    // advancement loop finite.
    advanced.unwrap_or(NaiveDate::MAX)
}

/// Step `date` forward by billing-cycle units until its local midnight in
/// `tz` is strictly after `now`. Returns `date` unchanged if it is already
/// in the future.
pub fn first_future_date(
    date: NaiveDate,
    cycle: BillingCycle,
    tz: Tz,
    now: DateTime<Utc>,
) -> NaiveDate {
    let mut next = date;
    while local_midnight(next, tz).with_timezone(&Utc) <= now {
        next = advance_date(next, cycle);
    }
    next
}

/// Whether a payment date, read as local midnight in `tz`, has been reached.
pub fn is_due(date: NaiveDate, tz: Tz, now: DateTime<Utc>) -> bool {
    local_midnight(date, tz).with_timezone(&Utc) <= now
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn parse_round_trips_billing_cycles() {
        for cycle in [
            BillingCycle::Weekly,
            BillingCycle::Monthly,
            BillingCycle::Quarterly,
            BillingCycle::Annually,
        ] {
            assert_eq!(cycle.as_str().parse::<BillingCycle>().unwrap(), cycle);
        }
        assert!("biweekly".parse::<BillingCycle>().is_err());
    }

    #[test]
    fn parse_round_trips_reminder_offsets() {
        for offset in [
            ReminderOffset::None,
            ReminderOffset::FifteenMinutes,
            ReminderOffset::OneHour,
            ReminderOffset::OneDay,
            ReminderOffset::OneWeek,
        ] {
            assert_eq!(offset.as_str().parse::<ReminderOffset>().unwrap(), offset);
        }
        assert!("2d".parse::<ReminderOffset>().is_err());
    }

    #[test]
    fn rejects_unknown_zone() {
        assert!(parse_zone("America/Springfield").is_err());
        assert!(parse_zone("UTC").is_ok());
    }

    #[test]
    fn scheduled_instant_is_deterministic() {
        let tz: Tz = "Asia/Tokyo".parse().unwrap();
        let d = date(2025, 6, 1);
        let a = scheduled_instant(d, tz, ReminderOffset::OneDay);
        let b = scheduled_instant(d, tz, ReminderOffset::OneDay);
        assert_eq!(a, b);
    }

    #[test]
    fn no_offset_is_local_midnight_in_utc() {
        // Tokyo is UTC+9 year round
        let tz: Tz = "Asia/Tokyo".parse().unwrap();
        let got = scheduled_instant(date(2025, 6, 1), tz, ReminderOffset::None);
        assert_eq!(got, utc("2025-05-31T15:00:00Z"));
    }

    // US spring-forward is 2025-03-09 02:00 in America/New_York. A one-day
    // offset from that payment date must land on 2025-03-08 local midnight
    // at the pre-transition offset (-05:00), not 24 hours before anything.
    #[test]
    fn one_day_offset_across_spring_forward() {
        let got = scheduled_instant(date(2025, 3, 9), New_York, ReminderOffset::OneDay);
        assert_eq!(got, utc("2025-03-08T05:00:00Z"));
    }

    // The day after the transition the UTC offset is -04:00; a calendar-day
    // subtraction lands on the transition day's local midnight (-05:00),
    // which is 23 real hours earlier, not 24.
    #[test]
    fn one_day_offset_spans_23_real_hours_after_transition() {
        let payment_midnight = local_midnight(date(2025, 3, 10), New_York).with_timezone(&Utc);
        assert_eq!(payment_midnight, utc("2025-03-10T04:00:00Z"));

        let got = scheduled_instant(date(2025, 3, 10), New_York, ReminderOffset::OneDay);
        assert_eq!(got, utc("2025-03-09T05:00:00Z"));
        assert_eq!((payment_midnight - got).num_hours(), 23);
    }

    #[test]
    fn minute_and_hour_offsets_are_exact_durations() {
        let midnight = local_midnight(date(2025, 11, 2), New_York).with_timezone(&Utc);
        let m15 = scheduled_instant(date(2025, 11, 2), New_York, ReminderOffset::FifteenMinutes);
        let h1 = scheduled_instant(date(2025, 11, 2), New_York, ReminderOffset::OneHour);
        assert_eq!(midnight - m15, Duration::minutes(15));
        assert_eq!(midnight - h1, Duration::hours(1));
    }

    #[test]
    fn week_offset_lands_on_local_midnight() {
        let got = scheduled_instant(date(2025, 3, 14), New_York, ReminderOffset::OneWeek);
        // 2025-03-07 is before the transition: -05:00
        assert_eq!(got, utc("2025-03-07T05:00:00Z"));
    }

    // America/Santiago springs forward at 2024-09-08 00:00 -> 01:00, so
    // local midnight does not exist on that date.
    #[test]
    fn skipped_midnight_resolves_past_the_gap() {
        let tz: Tz = "America/Santiago".parse().unwrap();
        let got = local_midnight(date(2024, 9, 8), tz);
        assert_eq!(got.with_timezone(&Utc), utc("2024-09-08T04:00:00Z"));
    }

    #[test]
    fn month_end_clamps_to_shorter_months() {
        assert_eq!(
            advance_date(date(2025, 1, 31), BillingCycle::Monthly),
            date(2025, 2, 28)
        );
        assert_eq!(
            advance_date(date(2024, 1, 31), BillingCycle::Monthly),
            date(2024, 2, 29)
        );
        assert_eq!(
            advance_date(date(2025, 11, 30), BillingCycle::Quarterly),
            date(2026, 2, 28)
        );
    }

    #[test]
    fn annual_step_clamps_leap_day() {
        assert_eq!(
            advance_date(date(2024, 2, 29), BillingCycle::Annually),
            date(2025, 2, 28)
        );
    }

    #[test]
    fn weekly_step_is_seven_days() {
        assert_eq!(
            advance_date(date(2025, 12, 29), BillingCycle::Weekly),
            date(2026, 1, 5)
        );
    }

    #[test]
    fn first_future_date_skips_every_elapsed_cycle() {
        let tz: Tz = "UTC".parse().unwrap();
        let now = utc("2025-03-15T12:00:00Z");
        let got = first_future_date(date(2025, 1, 31), BillingCycle::Monthly, tz, now);
        // Jan 31 -> Feb 28 -> Mar 28 (clamped day carries forward)
        assert_eq!(got, date(2025, 3, 28));
        assert!(local_midnight(got, tz).with_timezone(&Utc) > now);
    }

    #[test]
    fn first_future_date_keeps_future_dates_untouched() {
        let tz: Tz = "UTC".parse().unwrap();
        let now = utc("2025-03-15T12:00:00Z");
        let got = first_future_date(date(2025, 4, 1), BillingCycle::Monthly, tz, now);
        assert_eq!(got, date(2025, 4, 1));
    }

    #[test]
    fn first_future_date_is_zone_aware() {
        // 2025-06-02 00:00 in Auckland (UTC+12) is 2025-06-01T12:00Z. At
        // 2025-06-01T11:00Z the date is still in the future there, while a
        // naive UTC-midnight reading would consider it overdue.
        let tz: Tz = "Pacific/Auckland".parse().unwrap();
        let now = utc("2025-06-01T11:00:00Z");
        assert!(!is_due(date(2025, 6, 2), tz, now));
        assert_eq!(
            first_future_date(date(2025, 6, 2), BillingCycle::Weekly, tz, now),
            date(2025, 6, 2)
        );

        let later = utc("2025-06-01T13:00:00Z");
        assert!(is_due(date(2025, 6, 2), tz, later));
        assert_eq!(
            first_future_date(date(2025, 6, 2), BillingCycle::Weekly, tz, later),
            date(2025, 6, 9)
        );
    }
}
