use crate::domain::model::WeekInterval;
use crate::utils::error::{ReportError, Result};
use chrono::{Datelike, Duration, NaiveDate};

/// Expands `[start, end]` outward to full Monday-aligned calendar weeks and
/// returns one interval per week, oldest first. The intervals are contiguous,
/// non-overlapping and together cover the requested range.
pub fn bucket_weeks(start: NaiveDate, end: NaiveDate) -> Result<Vec<WeekInterval>> {
    if start > end {
        return Err(ReportError::InvalidRange {
            reason: format!("start {} is after end {}", start, end),
        });
    }

    let mut current = start - Duration::days(start.weekday().num_days_from_monday() as i64);
    let last = end + Duration::days((6 - end.weekday().num_days_from_monday()) as i64);

    let mut weeks = Vec::new();
    while current <= last {
        weeks.push(WeekInterval {
            start: current,
            end: current + Duration::days(6),
        });
        current += Duration::days(7);
    }

    Ok(weeks)
}
