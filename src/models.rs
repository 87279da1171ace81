use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalEnd {
    /// Still a member.
    Open,
    At(DateTime<Utc>),
    /// An end date was recorded but could not be read.
    Unreadable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MembershipInterval {
    pub group_id: String,
    /// `None` when the recorded start could not be read.
    pub start: Option<DateTime<Utc>>,
    pub end: IntervalEnd,
}

impl MembershipInterval {
    pub fn is_open(&self) -> bool {
        self.end == IntervalEnd::Open
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub current_group_id: Option<String>,
    /// Insertion order, which is not necessarily chronological.
    pub membership_history: Vec<MembershipInterval>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    NotPresent,
}

impl AttendanceStatus {
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("present") {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::NotPresent
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceReport {
    pub id: String,
    pub group_id: Option<String>,
    /// `None` when the document had no readable meeting date.
    pub report_date: Option<DateTime<Utc>>,
    /// `None` when the document's attendance field was not a mapping.
    pub attendance: Option<BTreeMap<String, AttendanceStatus>>,
    pub guest_count: u32,
    pub offering_amount: f64,
}

#[derive(Debug, Clone)]
pub struct WeekBucket<'a> {
    pub week_start: NaiveDate,
    pub reports: Vec<&'a AttendanceReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekTotals {
    pub week_start: NaiveDate,
    pub valid_reports: usize,
    pub reporting_group_count: usize,
    pub present: usize,
    pub guests: u64,
    pub offering: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklySummary {
    pub label: String,
    pub week_start: NaiveDate,
    pub reporting_group_count: usize,
    pub average_present_plus_guests: f64,
    pub average_guests_only: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub group_id: String,
    pub report_count: usize,
    pub avg_present: f64,
    pub total_guests: u64,
    pub total_offering: f64,
}
