//! Weekly attendance trends for Connect groups.
//!
//! Attendance reports are bucketed into Sunday-aligned weeks and rolled up
//! per week, counting only members who actually belonged to the reporting
//! group on the meeting date according to their membership history.

pub mod attendance;
pub mod membership;
pub mod models;
pub mod report;
pub mod snapshot;
pub mod timestamp;
pub mod weeks;

pub use attendance::{compute_week_totals, compute_weekly_summaries, compute_weekly_summaries_for};
pub use membership::is_member_of_group_at_date;
pub use models::{AttendanceReport, Member, MembershipInterval, WeeklySummary};
pub use weeks::{bucket_by_week, week_start, DEFAULT_TREND_WEEKS};
