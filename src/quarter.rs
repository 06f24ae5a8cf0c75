use time::{Date, Month, OffsetDateTime, UtcOffset};

/// Start (00:00 UTC on Jan/Apr/Jul/Oct 1) of the civil quarter containing `now`.
pub fn quarter_start(now: OffsetDateTime) -> OffsetDateTime {
    let now = now.to_offset(UtcOffset::UTC);
    let first_month = match now.month() {
        Month::January | Month::February | Month::March => Month::January,
        Month::April | Month::May | Month::June => Month::April,
        Month::July | Month::August | Month::September => Month::July,
        Month::October | Month::November | Month::December => Month::October,
    };
    Date::from_calendar_date(now.year(), first_month, 1)
        .expect("day 1 exists in every month")
        .midnight()
        .assume_utc()
}

/// A record is frozen once its observation instant precedes the current quarter.
pub fn is_frozen(observed_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    observed_at < quarter_start(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn quarter_start_for_each_quarter() {
        assert_eq!(
            quarter_start(datetime!(2025-02-14 08:30 UTC)),
            datetime!(2025-01-01 00:00 UTC)
        );
        assert_eq!(
            quarter_start(datetime!(2025-06-30 23:59:59 UTC)),
            datetime!(2025-04-01 00:00 UTC)
        );
        assert_eq!(
            quarter_start(datetime!(2025-07-01 00:00 UTC)),
            datetime!(2025-07-01 00:00 UTC)
        );
        assert_eq!(
            quarter_start(datetime!(2025-12-31 12:00 UTC)),
            datetime!(2025-10-01 00:00 UTC)
        );
    }

    #[test]
    fn quarter_start_uses_utc_not_local_offset() {
        // 2025-04-01 01:00 at +03:00 is still March 31 in UTC.
        let now = datetime!(2025-04-01 01:00 +3);
        assert_eq!(quarter_start(now), datetime!(2025-01-01 00:00 UTC));
    }

    #[test]
    fn frozen_is_strictly_before_boundary() {
        let now = datetime!(2025-08-26 10:00 UTC);
        assert!(is_frozen(datetime!(2025-06-30 23:59:59 UTC), now));
        assert!(!is_frozen(datetime!(2025-07-01 00:00 UTC), now));
        assert!(!is_frozen(datetime!(2025-08-26 09:00 UTC), now));
    }

    #[test]
    fn record_becomes_frozen_as_time_passes() {
        let observed = datetime!(2025-09-15 12:00 UTC);
        assert!(!is_frozen(observed, datetime!(2025-09-30 23:00 UTC)));
        assert!(is_frozen(observed, datetime!(2025-10-01 00:00 UTC)));
    }
}
