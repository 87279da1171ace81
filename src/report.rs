use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::attendance::{round_to_tenth, Roster};
use crate::models::{AttendanceReport, GroupSummary, Member, WeekTotals, WeeklySummary};
use crate::weeks;

const UNGROUPED: &str = "(no group)";

/// Reports that fall inside the most recent `trend_weeks` reporting weeks.
pub fn reports_in_window(reports: &[AttendanceReport], trend_weeks: usize) -> Vec<&AttendanceReport> {
    weeks::select_recent_weeks(weeks::bucket_by_week(reports), trend_weeks)
        .into_iter()
        .flat_map(|bucket| bucket.reports)
        .collect()
}

pub fn summarize_by_group(reports: &[&AttendanceReport], members: &[Member]) -> Vec<GroupSummary> {
    let roster = Roster::new(members);
    let mut map: BTreeMap<String, (usize, usize, u64, f64)> = BTreeMap::new();

    for report in reports {
        if report.report_date.is_none() || report.attendance.is_none() {
            continue;
        }
        let key = report.group_id.clone().unwrap_or_else(|| UNGROUPED.to_string());
        let entry = map.entry(key).or_insert((0, 0, 0, 0.0));
        entry.0 += 1;
        entry.1 += roster.present_count(report, None);
        entry.2 += u64::from(report.guest_count);
        entry.3 += report.offering_amount;
    }

    let mut summaries: Vec<GroupSummary> = map
        .into_iter()
        .map(
            |(group_id, (report_count, present, total_guests, total_offering))| GroupSummary {
                group_id,
                report_count,
                avg_present: if report_count == 0 {
                    0.0
                } else {
                    present as f64 / report_count as f64
                },
                total_guests,
                total_offering,
            },
        )
        .collect();

    summaries.sort_by(|a, b| {
        b.report_count
            .cmp(&a.report_count)
            .then_with(|| a.group_id.cmp(&b.group_id))
    });
    summaries
}

pub fn build_report(
    group: Option<&str>,
    trend_weeks: usize,
    totals: &[WeekTotals],
    summaries: &[WeeklySummary],
    groups: &[GroupSummary],
) -> String {
    let mut output = String::new();
    let scope_label = group.unwrap_or("all groups");

    let _ = writeln!(output, "# Connect Attendance Report");
    let _ = writeln!(
        output,
        "Generated for {} (last {} reporting weeks)",
        scope_label, trend_weeks
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Trend");

    if summaries.is_empty() {
        let _ = writeln!(output, "No attendance reports recorded for this window.");
    } else {
        let _ = writeln!(
            output,
            "| Week | Groups reporting | Avg attendance (incl. guests) | Avg guests | Present | Guests | Offering |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|");
        for (summary, week) in summaries.iter().zip(totals.iter()) {
            let _ = writeln!(
                output,
                "| {} | {} | {:.1} | {:.1} | {} | {} | {:.2} |",
                summary.label,
                summary.reporting_group_count,
                round_to_tenth(summary.average_present_plus_guests),
                round_to_tenth(summary.average_guests_only),
                week.present,
                week.guests,
                week.offering
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Group Breakdown");

    if groups.is_empty() {
        let _ = writeln!(output, "No groups reported in this window.");
    } else {
        for summary in groups.iter() {
            let _ = writeln!(
                output,
                "- {}: {} reports (avg present {:.1}), {} guests, offering {:.2}",
                summary.group_id,
                summary.report_count,
                round_to_tenth(summary.avg_present),
                summary.total_guests,
                summary.total_offering
            );
        }
    }

    output
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    week_start: String,
    label: &'a str,
    reporting_groups: usize,
    avg_present_plus_guests: f64,
    avg_guests_only: f64,
}

pub fn write_summaries_csv(path: &Path, summaries: &[WeeklySummary]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    for summary in summaries {
        writer.serialize(SummaryRow {
            week_start: summary.week_start.to_string(),
            label: &summary.label,
            reporting_groups: summary.reporting_group_count,
            avg_present_plus_guests: round_to_tenth(summary.average_present_plus_guests),
            avg_guests_only: round_to_tenth(summary.average_guests_only),
        })?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::compute_week_totals;
    use crate::models::AttendanceStatus;
    use chrono::{TimeZone, Utc};

    fn report(id: &str, group: Option<&str>, day: u32, present: &[&str], guests: u32) -> AttendanceReport {
        AttendanceReport {
            id: id.to_string(),
            group_id: group.map(str::to_string),
            report_date: Some(Utc.with_ymd_and_hms(2024, 3, day, 19, 0, 0).unwrap()),
            attendance: Some(
                present
                    .iter()
                    .map(|m| (m.to_string(), AttendanceStatus::Present))
                    .collect(),
            ),
            guest_count: guests,
            offering_amount: 20.0,
        }
    }

    fn member(id: &str, group: &str) -> Member {
        Member {
            id: id.to_string(),
            name: id.to_string(),
            current_group_id: Some(group.to_string()),
            membership_history: vec![],
        }
    }

    #[test]
    fn groups_sort_by_report_count() {
        let members = vec![member("a", "g1"), member("b", "g2")];
        let reports = vec![
            report("r1", Some("g2"), 4, &["b"], 1),
            report("r2", Some("g1"), 5, &["a"], 0),
            report("r3", Some("g2"), 11, &["b"], 2),
            report("r4", None, 12, &["a"], 0),
        ];
        let refs: Vec<&AttendanceReport> = reports.iter().collect();

        let groups = summarize_by_group(&refs, &members);
        let ids: Vec<&str> = groups.iter().map(|g| g.group_id.as_str()).collect();
        assert_eq!(ids, vec!["g2", UNGROUPED, "g1"]);
        assert_eq!(groups[0].report_count, 2);
        assert_eq!(groups[0].avg_present, 1.0);
        assert_eq!(groups[0].total_guests, 3);
        assert_eq!(groups[0].total_offering, 40.0);
        assert_eq!(groups[1].avg_present, 1.0);
    }

    #[test]
    fn window_limits_reports() {
        let reports = vec![
            report("r1", Some("g1"), 4, &[], 0),
            report("r2", Some("g1"), 11, &[], 0),
            report("r3", Some("g1"), 18, &[], 0),
        ];
        let ids: Vec<&str> = reports_in_window(&reports, 2)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["r2", "r3"]);
    }

    #[test]
    fn report_lists_weeks_and_groups() {
        let members = vec![member("a", "g1")];
        let reports = vec![report("r1", Some("g1"), 5, &["a"], 2)];
        let totals = compute_week_totals(&reports, &members, None, 4);
        let summaries: Vec<WeeklySummary> =
            totals.iter().map(crate::attendance::summarize_week).collect();
        let refs: Vec<&AttendanceReport> = reports.iter().collect();
        let groups = summarize_by_group(&refs, &members);

        let output = build_report(None, 4, &totals, &summaries, &groups);
        assert!(output.contains("Generated for all groups (last 4 reporting weeks)"));
        assert!(output.contains("| Week of Mar 3, 2024 | 1 | 3.0 | 2.0 | 1 | 2 | 20.00 |"));
        assert!(output.contains("- g1: 1 reports (avg present 1.0), 2 guests, offering 20.00"));
    }

    #[test]
    fn empty_report_says_so() {
        let output = build_report(Some("g1"), 4, &[], &[], &[]);
        assert!(output.contains("Generated for g1"));
        assert!(output.contains("No attendance reports recorded for this window."));
        assert!(output.contains("No groups reported in this window."));
    }
}
