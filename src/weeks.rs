use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use tracing::trace;

use crate::models::{AttendanceReport, WeekBucket};

/// Number of trailing weeks shown in trend views.
pub const DEFAULT_TREND_WEEKS: usize = 4;

/// The Sunday (UTC calendar day) of the week containing `instant`.
pub fn week_start(instant: DateTime<Utc>) -> NaiveDate {
    let day = instant.date_naive();
    day - Duration::days(i64::from(day.weekday().num_days_from_sunday()))
}

pub fn week_label(week_start: NaiveDate) -> String {
    format!("Week of {}", week_start.format("%b %-d, %Y"))
}

/// Groups reports by the Sunday of their meeting week. Reports without a
/// readable date or attendance mapping are left out.
pub fn bucket_by_week(reports: &[AttendanceReport]) -> BTreeMap<NaiveDate, Vec<&AttendanceReport>> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&AttendanceReport>> = BTreeMap::new();

    for report in reports {
        let Some(date) = report.report_date else {
            trace!(report_id = %report.id, "skipping report without a meeting date");
            continue;
        };
        if report.attendance.is_none() {
            trace!(report_id = %report.id, "skipping report without an attendance mapping");
            continue;
        }

        buckets.entry(week_start(date)).or_default().push(report);
    }

    buckets
}

/// Keeps the `limit` most recent weeks, oldest first.
pub fn select_recent_weeks<'a>(
    buckets: BTreeMap<NaiveDate, Vec<&'a AttendanceReport>>,
    limit: usize,
) -> Vec<WeekBucket<'a>> {
    let mut selected: Vec<WeekBucket<'a>> = buckets
        .into_iter()
        .rev()
        .filter(|(_, reports)| !reports.is_empty())
        .take(limit)
        .map(|(week_start, reports)| WeekBucket {
            week_start,
            reports,
        })
        .collect();

    selected.reverse();
    selected
}
