use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};

/// `--as-of-date` if given, otherwise today's UTC date.
///
/// The last point of every generated history is dated `as_of_date`, and
/// days-since-lowest is measured against it.
pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    let today = now_utc.date_naive();
    let Some(s) = as_of_date_arg else {
        return Ok(today);
    };

    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid as-of date {s:?}, expected YYYY-MM-DD"))?;
    anyhow::ensure!(date <= today, "as-of date {date} is in the future");
    Ok(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 23, 30, 0).unwrap()
    }

    #[test]
    fn defaults_to_utc_today() {
        let d = resolve_as_of_date(None, now()).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
    }

    #[test]
    fn parses_explicit_date() {
        let d = resolve_as_of_date(Some(" 2026-02-27 "), now()).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2026, 2, 27).unwrap());
    }

    #[test]
    fn rejects_bad_or_future_dates() {
        assert!(resolve_as_of_date(Some("27/02/2026"), now()).is_err());
        assert!(resolve_as_of_date(Some("2026-03-11"), now()).is_err());
    }
}
