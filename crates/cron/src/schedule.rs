//! Next-run computation.

use {
    chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc},
    chrono_tz::Tz,
};

use crate::{
    error::{Error, Result},
    parse::CronExpr,
};

/// How far ahead to search before declaring an expression unsatisfiable.
const SEARCH_HORIZON_DAYS: i64 = 366;

/// Compute the first matching minute strictly after `after_ms`, evaluating
/// the fields in `tz`. Returns epoch milliseconds.
///
/// Day-of-month and day-of-week must both match.
pub fn next_run(expr: &CronExpr, after_ms: u64, tz: Tz) -> Result<u64> {
    let secs = i64::try_from(after_ms / 1000).unwrap_or(i64::MAX);
    let minute_start = secs - secs.rem_euclid(60);
    let mut t: DateTime<Utc> = Utc
        .timestamp_opt(minute_start, 0)
        .single()
        .ok_or_else(|| Error::cron_parse(expr.source(), "start time out of range"))?
        + Duration::minutes(1);
    let limit = t + Duration::days(SEARCH_HORIZON_DAYS);

    while t <= limit {
        let local = t.with_timezone(&tz);
        let day_and_hour_match = expr.months.contains(&local.month())
            && expr.days_of_month.contains(&local.day())
            && expr
                .days_of_week
                .contains(&local.weekday().num_days_from_sunday())
            && expr.hours.contains(&local.hour());

        if !day_and_hour_match {
            // Jump to the next local hour boundary.
            t += Duration::minutes(i64::from(60 - local.minute()));
            continue;
        }
        if expr.minutes.contains(&local.minute()) {
            return Ok(u64::try_from(t.timestamp_millis()).unwrap_or_default());
        }
        t += Duration::minutes(1);
    }

    Err(Error::cron_parse(
        expr.source(),
        format!("no matching time within {SEARCH_HORIZON_DAYS} days"),
    ))
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse().map_err(|_| Error::unknown_timezone(name))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::parse::parse_cron, hive_common::ErrorCode};

    fn ms(rfc3339: &str) -> u64 {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .timestamp_millis() as u64
    }

    fn next(expr: &str, after: &str) -> u64 {
        next_run(&parse_cron(expr).unwrap(), ms(after), Tz::UTC).unwrap()
    }

    #[test]
    fn next_quarter_hour() {
        assert_eq!(
            next("*/15 * * * *", "2026-03-02T10:07:30Z"),
            ms("2026-03-02T10:15:00Z")
        );
    }

    #[test]
    fn strictly_after() {
        assert_eq!(
            next("*/15 * * * *", "2026-03-02T10:15:00Z"),
            ms("2026-03-02T10:30:00Z")
        );
        assert_eq!(
            next("* * * * *", "2026-03-02T10:15:59.999Z"),
            ms("2026-03-02T10:16:00Z")
        );
    }

    #[test]
    fn weekday_schedule_skips_weekend() {
        // 2026-03-07 is a Saturday.
        assert_eq!(
            next("0 9 * * 1-5", "2026-03-07T12:00:00Z"),
            ms("2026-03-09T09:00:00Z")
        );
    }

    #[test]
    fn day_fields_are_anded() {
        // Next Friday the 13th after 2026-03-01.
        assert_eq!(
            next("0 0 13 * 5", "2026-03-01T00:00:00Z"),
            ms("2026-03-13T00:00:00Z")
        );
        assert_eq!(
            next("0 0 13 * 5", "2026-03-13T00:00:00Z"),
            ms("2026-11-13T00:00:00Z")
        );
    }

    #[test]
    fn rolls_over_year_end() {
        assert_eq!(
            next("30 6 1 1 *", "2026-06-15T00:00:00Z"),
            ms("2027-01-01T06:30:00Z")
        );
    }

    #[test]
    fn evaluates_in_timezone() {
        let expr = parse_cron("0 9 * * *").unwrap();
        let paris: Tz = parse_timezone("Europe/Paris").unwrap();
        // Winter: UTC+1.
        assert_eq!(
            next_run(&expr, ms("2026-01-10T12:00:00Z"), paris).unwrap(),
            ms("2026-01-11T08:00:00Z")
        );
        // Summer: UTC+2.
        assert_eq!(
            next_run(&expr, ms("2026-07-10T12:00:00Z"), paris).unwrap(),
            ms("2026-07-11T07:00:00Z")
        );
    }

    #[test]
    fn unsatisfiable_expression_fails() {
        let err = next_run(
            &parse_cron("0 0 31 2 *").unwrap(),
            ms("2026-01-01T00:00:00Z"),
            Tz::UTC,
        )
        .unwrap_err();
        assert_eq!(err.code(), "CRON_PARSE");
        assert!(err.to_string().contains("no matching time"));
    }

    #[test]
    fn always_after_input() {
        let exprs = ["* * * * *", "59 23 * * *", "0 0 1 * *", "*/7 */5 * * 0,6"];
        let starts = [
            "2026-02-28T23:59:00Z",
            "2026-12-31T23:59:59Z",
            "2028-02-29T12:34:56Z",
        ];
        for e in exprs {
            for s in starts {
                assert!(next(e, s) > ms(s), "{e} after {s}");
            }
        }
    }

    #[test]
    fn unknown_timezone() {
        let err = parse_timezone("Nowhere/City").unwrap_err();
        assert_eq!(err.code(), "SCHEDULER_TIMEZONE");
    }
}
