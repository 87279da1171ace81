use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::membership::is_member_of_group_at_date;
use crate::models::{
    AttendanceReport, AttendanceStatus, Member, WeekBucket, WeekTotals, WeeklySummary,
};
use crate::weeks::{self, DEFAULT_TREND_WEEKS};

/// Members keyed by id, for resolving attendance entries.
pub struct Roster<'a> {
    by_id: HashMap<&'a str, &'a Member>,
}

impl<'a> Roster<'a> {
    pub fn new(members: &'a [Member]) -> Self {
        let by_id = members
            .iter()
            .map(|member| (member.id.as_str(), member))
            .collect();
        Self { by_id }
    }

    /// Counts entries marked present whose member belonged to the report's
    /// group on the meeting date. `pinned_group` overrides the report's own
    /// group. Unknown member ids never count.
    pub fn present_count(&self, report: &AttendanceReport, pinned_group: Option<&str>) -> usize {
        let (Some(date), Some(attendance)) = (report.report_date, report.attendance.as_ref()) else {
            return 0;
        };
        let group_id = pinned_group.or(report.group_id.as_deref());

        attendance
            .iter()
            .filter(|(_, status)| **status == AttendanceStatus::Present)
            .filter(|(member_id, _)| {
                self.by_id
                    .get(member_id.as_str())
                    .is_some_and(|member| is_member_of_group_at_date(member, group_id, date))
            })
            .count()
    }
}

pub fn week_totals(bucket: &WeekBucket<'_>, roster: &Roster<'_>, group_id: Option<&str>) -> WeekTotals {
    let mut groups: BTreeSet<Option<&str>> = BTreeSet::new();
    let mut totals = WeekTotals {
        week_start: bucket.week_start,
        valid_reports: 0,
        reporting_group_count: 0,
        present: 0,
        guests: 0,
        offering: 0.0,
    };

    for report in bucket.reports.iter() {
        if report.report_date.is_none() || report.attendance.is_none() {
            continue;
        }

        totals.valid_reports += 1;
        groups.insert(report.group_id.as_deref());
        totals.present += roster.present_count(report, group_id);
        totals.guests += u64::from(report.guest_count);
        totals.offering += report.offering_amount;
    }

    totals.reporting_group_count = groups.len();
    totals
}

pub fn summarize_week(totals: &WeekTotals) -> WeeklySummary {
    let (average_present_plus_guests, average_guests_only) = if totals.reporting_group_count == 0 {
        (0.0, 0.0)
    } else {
        let groups = totals.reporting_group_count as f64;
        (
            (totals.present as f64 + totals.guests as f64) / groups,
            totals.guests as f64 / groups,
        )
    };

    WeeklySummary {
        label: weeks::week_label(totals.week_start),
        week_start: totals.week_start,
        reporting_group_count: totals.reporting_group_count,
        average_present_plus_guests,
        average_guests_only,
    }
}

/// Raw totals per bucket, in bucket order.
pub fn aggregate_totals(
    buckets: &[WeekBucket<'_>],
    members: &[Member],
    group_id: Option<&str>,
) -> Vec<WeekTotals> {
    let roster = Roster::new(members);
    buckets
        .iter()
        .map(|bucket| week_totals(bucket, &roster, group_id))
        .collect()
}

/// One summary per bucket, in bucket order.
pub fn aggregate(
    buckets: &[WeekBucket<'_>],
    members: &[Member],
    group_id: Option<&str>,
) -> Vec<WeeklySummary> {
    aggregate_totals(buckets, members, group_id)
        .iter()
        .map(summarize_week)
        .collect()
}

fn recent_buckets(reports: &[AttendanceReport], trend_weeks: usize) -> Vec<WeekBucket<'_>> {
    let buckets = weeks::select_recent_weeks(weeks::bucket_by_week(reports), trend_weeks);
    debug!(
        reports = reports.len(),
        weeks = buckets.len(),
        "selected reporting weeks"
    );
    buckets
}

pub fn compute_week_totals(
    reports: &[AttendanceReport],
    members: &[Member],
    group_id: Option<&str>,
    trend_weeks: usize,
) -> Vec<WeekTotals> {
    aggregate_totals(&recent_buckets(reports, trend_weeks), members, group_id)
}

pub fn compute_weekly_summaries_for(
    reports: &[AttendanceReport],
    members: &[Member],
    group_id: Option<&str>,
    trend_weeks: usize,
) -> Vec<WeeklySummary> {
    aggregate(&recent_buckets(reports, trend_weeks), members, group_id)
}

/// Weekly trend over the most recent weeks that have reports, oldest first.
pub fn compute_weekly_summaries(
    reports: &[AttendanceReport],
    members: &[Member],
    group_id: Option<&str>,
) -> Vec<WeeklySummary> {
    compute_weekly_summaries_for(reports, members, group_id, DEFAULT_TREND_WEEKS)
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
