use crate::domain::model::{MergedRow, MergedSeries, WeeklyCount};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Indexes a weekly series by week start, for use as the secondary side of
/// [`merge`].
pub fn by_week_start(series: &[WeeklyCount]) -> HashMap<NaiveDate, u64> {
    series.iter().map(|entry| (entry.start, entry.count)).collect()
}

/// Zips the primary weekly series with the secondary per-week counts into
/// one row set, tracking the running maximum of the combined totals.
///
/// The primary series drives row production: a week missing from
/// `secondary` contributes 0, and a week present only in `secondary` is
/// dropped. Row order follows the primary series (ascending by week start
/// everywhere in this crate).
pub fn merge(primary: &[WeeklyCount], secondary: &HashMap<NaiveDate, u64>) -> MergedSeries {
    let mut rows = Vec::with_capacity(primary.len());
    let mut max = 0;

    for entry in primary {
        let github = secondary.get(&entry.start).copied().unwrap_or(0);
        let total = entry.count + github;
        max = max.max(total);
        rows.push(MergedRow {
            start: entry.start,
            end: entry.end,
            bugzilla: entry.count,
            github,
            total,
        });
    }

    MergedSeries { rows, max }
}
