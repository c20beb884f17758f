//! Data source date window arithmetic (§4.5): turns a control's
//! `period_back`/`period_number`/`period_type` configuration, plus the
//! scheduler moment that triggered the run, into a concrete `[date_from,
//! date_to]` window.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodType {
    Day,
    Week,
    Month,
}

impl PeriodType {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "D" => Some(PeriodType::Day),
            "W" => Some(PeriodType::Week),
            "M" => Some(PeriodType::Month),
            _ => None,
        }
    }
}

fn month_date_from(date: NaiveDate) -> NaiveDate {
    date.with_day(1).expect("day 1 is always valid")
}

fn month_date_to(date: NaiveDate) -> NaiveDate {
    let first_of_next = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
    .expect("next month is always valid");
    first_of_next - Duration::days(1)
}

/// Lower bound of the fetch window, given the moment the run was
/// triggered at (truncated to midnight, per the original's `parse_date`
/// with `hour=minute=second=0`).
pub fn date_from(moment: DateTime<Utc>, period_back: i32, period_type: PeriodType) -> DateTime<Utc> {
    let current = moment.date_naive();
    let target = match period_type {
        PeriodType::Day => current - Duration::days(period_back as i64),
        PeriodType::Week => current - Duration::weeks(period_back as i64),
        PeriodType::Month => {
            let mut calculated = month_date_from(current);
            let mut remaining = period_back;
            while remaining > 0 {
                calculated = month_date_from(calculated - Duration::days(1));
                remaining -= 1;
            }
            calculated
        }
    };
    Utc.from_utc_datetime(&target.and_hms_opt(0, 0, 0).unwrap())
}

/// Upper bound of the fetch window, built from `date_from` at 23:59:59.
pub fn date_to(date_from: DateTime<Utc>, period_number: i32, period_type: PeriodType) -> DateTime<Utc> {
    let current = date_from.date_naive();
    let target = match period_type {
        PeriodType::Day => current + Duration::days((period_number - 1) as i64),
        PeriodType::Week => {
            let calculated = current + Duration::weeks(period_number as i64);
            calculated - Duration::days(1)
        }
        PeriodType::Month => {
            let mut calculated = month_date_to(current);
            let mut remaining = period_number - 1;
            while remaining > 0 {
                calculated = month_date_to(calculated + Duration::days(1));
                remaining -= 1;
            }
            calculated
        }
    };
    Utc.from_utc_datetime(&target.and_hms_opt(23, 59, 59).unwrap())
}

/// Parse the triggering moment and a `days_back` offset into the final
/// `(date_from, date_to)` window.
pub fn parse_dates(
    moment: DateTime<Utc>,
    days_back: i32,
    period_back: i32,
    period_number: i32,
    period_type: PeriodType,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let from = date_from(moment, period_back, period_type) - Duration::days(days_back as i64);
    let to = date_to(date_from(moment, period_back, period_type), period_number, period_type)
        - Duration::days(days_back as i64);
    (from, to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn daily_window_is_one_day_back_by_default() {
        let moment = at(2026, 7, 27);
        let from = date_from(moment, 1, PeriodType::Day);
        assert_eq!(from.date_naive(), NaiveDate::from_ymd_opt(2026, 7, 26).unwrap());
        let to = date_to(from, 1, PeriodType::Day);
        assert_eq!(to.date_naive(), NaiveDate::from_ymd_opt(2026, 7, 26).unwrap());
    }

    #[test]
    fn monthly_window_spans_whole_previous_month() {
        let moment = at(2026, 7, 15);
        let from = date_from(moment, 1, PeriodType::Month);
        assert_eq!(from.date_naive(), NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
        let to = date_to(from, 1, PeriodType::Month);
        assert_eq!(to.date_naive(), NaiveDate::from_ymd_opt(2026, 6, 30).unwrap());
    }

    #[test]
    fn weekly_window_spans_seven_days() {
        let moment = at(2026, 7, 27);
        let from = date_from(moment, 1, PeriodType::Week);
        let to = date_to(from, 1, PeriodType::Week);
        assert_eq!((to - from).num_days(), 6);
    }
}
