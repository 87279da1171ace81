//! Member and report documents as exported from the document store.
//!
//! Documents were written by several generations of clients, so any field
//! may be missing or carry an unexpected type. Reading is lenient: a bad
//! field becomes "absent" and the rest of the document still loads.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::models::{AttendanceReport, AttendanceStatus, IntervalEnd, Member, MembershipInterval};
use crate::timestamp::{normalize_timestamp, RawTimestamp};

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDocument {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub current_group_id: Option<String>,
    #[serde(default)]
    pub membership_history: Option<Value>,
}

impl MemberDocument {
    /// `None` for documents without an id, which attendance can never
    /// reference.
    pub fn to_member(&self) -> Option<Member> {
        let id = self.id.clone().filter(|id| !id.is_empty())?;
        Some(Member {
            name: self.name.clone().unwrap_or_else(|| id.clone()),
            id,
            current_group_id: self.current_group_id.clone().filter(|g| !g.is_empty()),
            membership_history: self
                .membership_history
                .as_ref()
                .map(parse_history)
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntervalDocument {
    #[serde(default, deserialize_with = "lenient")]
    group_id: Option<String>,
    #[serde(default)]
    start_date: Option<RawTimestamp>,
    #[serde(default)]
    end_date: Option<RawTimestamp>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub report_date: Option<RawTimestamp>,
    #[serde(default)]
    pub attendance: Option<Value>,
    #[serde(default)]
    pub guest_count: Option<Value>,
    #[serde(default)]
    pub offering_amount: Option<Value>,
}

impl ReportDocument {
    pub fn to_report(&self, fallback_id: &str) -> AttendanceReport {
        AttendanceReport {
            id: self.stable_id().unwrap_or_else(|| fallback_id.to_string()),
            group_id: self.group_id(),
            report_date: normalize_timestamp(self.report_date.as_ref()),
            attendance: self.attendance.as_ref().and_then(parse_attendance),
            guest_count: parse_guest_count(self.guest_count.as_ref()),
            offering_amount: parse_amount(self.offering_amount.as_ref()),
        }
    }

    pub fn group_id(&self) -> Option<String> {
        self.group_id.clone().filter(|g| !g.is_empty())
    }

    /// The document id, or one derived from the group and meeting date so
    /// that re-importing the same export maps onto the same report. `None`
    /// when there is neither an id nor a readable date.
    pub fn stable_id(&self) -> Option<String> {
        if let Some(id) = self.id.clone().filter(|id| !id.is_empty()) {
            return Some(id);
        }

        let date = normalize_timestamp(self.report_date.as_ref())?;
        let key = format!(
            "connect-attendance/report/{}/{}",
            self.group_id().unwrap_or_default(),
            date.to_rfc3339()
        );
        Some(format!(
            "import-{}",
            Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes())
        ))
    }
}

/// A report as persisted in the store: cleaned scalar columns next to the
/// raw attendance document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub id: String,
    pub group_id: Option<String>,
    pub report_date: Option<DateTime<Utc>>,
    pub attendance: Option<Value>,
    pub guest_count: i32,
    pub offering_amount: f64,
}

impl StoredReport {
    /// `None` for documents that have neither an id nor a readable date;
    /// they could never be counted and have no stable key.
    pub fn from_document(document: &ReportDocument) -> Option<Self> {
        let id = document.stable_id()?;
        Some(StoredReport {
            id,
            group_id: document.group_id(),
            report_date: normalize_timestamp(document.report_date.as_ref()),
            attendance: document.attendance.clone(),
            guest_count: i32::try_from(parse_guest_count(document.guest_count.as_ref()))
                .unwrap_or(i32::MAX),
            offering_amount: parse_amount(document.offering_amount.as_ref()),
        })
    }

    pub fn to_report(&self) -> AttendanceReport {
        AttendanceReport {
            id: self.id.clone(),
            group_id: self.group_id.clone().filter(|g| !g.is_empty()),
            report_date: self.report_date,
            attendance: self.attendance.as_ref().and_then(parse_attendance),
            guest_count: u32::try_from(self.guest_count).unwrap_or(0),
            offering_amount: non_negative(Some(self.offering_amount)),
        }
    }
}

/// A JSON export of the member and report collections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub members: Vec<Value>,
    #[serde(default)]
    pub reports: Vec<Value>,
}

impl Snapshot {
    pub fn member_documents(&self) -> Vec<MemberDocument> {
        self.members
            .iter()
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect()
    }

    pub fn report_documents(&self) -> Vec<ReportDocument> {
        self.reports
            .iter()
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect()
    }

    pub fn members(&self) -> Vec<Member> {
        let members: Vec<Member> = self
            .member_documents()
            .iter()
            .filter_map(MemberDocument::to_member)
            .collect();
        if members.len() != self.members.len() {
            debug!(
                dropped = self.members.len() - members.len(),
                "dropped member documents without an id"
            );
        }
        members
    }

    pub fn reports(&self) -> Vec<AttendanceReport> {
        self.report_documents()
            .iter()
            .enumerate()
            .map(|(index, document)| document.to_report(&format!("report-{index}")))
            .collect()
    }
}

pub fn load_snapshot(path: &Path) -> anyhow::Result<Snapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("snapshot {} is not a valid export", path.display()))
}

/// Reads a stored membership history. Entries without a group are dropped.
pub fn parse_history(value: &Value) -> Vec<MembershipInterval> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<IntervalDocument>(entry.clone()).ok())
        .filter_map(|doc| {
            let group_id = doc.group_id.filter(|g| !g.is_empty())?;
            let end = match doc.end_date.as_ref() {
                None => IntervalEnd::Open,
                Some(raw) => raw.normalize().map_or(IntervalEnd::Unreadable, IntervalEnd::At),
            };
            Some(MembershipInterval {
                group_id,
                start: normalize_timestamp(doc.start_date.as_ref()),
                end,
            })
        })
        .collect()
}

/// `None` unless the value is a mapping of member id to status.
pub fn parse_attendance(value: &Value) -> Option<BTreeMap<String, AttendanceStatus>> {
    let Value::Object(entries) = value else {
        return None;
    };

    Some(
        entries
            .iter()
            .map(|(member_id, status)| {
                let status = match status {
                    Value::String(label) => AttendanceStatus::from_label(label),
                    _ => AttendanceStatus::NotPresent,
                };
                (member_id.clone(), status)
            })
            .collect(),
    )
}

fn parse_number(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    non_negative(number)
}

fn non_negative(number: Option<f64>) -> f64 {
    match number {
        Some(n) if n.is_finite() && n > 0.0 => n,
        _ => 0.0,
    }
}

pub fn parse_guest_count(value: Option<&Value>) -> u32 {
    parse_number(value).trunc().min(f64::from(u32::MAX)) as u32
}

pub fn parse_amount(value: Option<&Value>) -> f64 {
    parse_number(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn member_document_tolerates_odd_fields() {
        let doc: MemberDocument = serde_json::from_value(json!({
            "id": "m1",
            "name": 42,
            "currentGroupId": "g1",
            "membershipHistory": [
                { "groupId": "g1", "startDate": "2024-01-01", "endDate": null },
                { "groupId": "g0", "startDate": 1672531200000u64, "endDate": { "seconds": 1685577600, "nanoseconds": 0 } },
                { "groupId": "g9", "startDate": "sometime", "endDate": "later" },
                { "startDate": "2020-01-01" },
                "not an interval"
            ]
        }))
        .unwrap();

        let member = doc.to_member().unwrap();
        assert_eq!(member.name, "m1");
        assert_eq!(member.current_group_id.as_deref(), Some("g1"));
        assert_eq!(member.membership_history.len(), 3);

        let first = &member.membership_history[0];
        assert_eq!(first.start, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(first.end, IntervalEnd::Open);

        let second = &member.membership_history[1];
        assert_eq!(second.start, Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(
            second.end,
            IntervalEnd::At(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap())
        );

        let third = &member.membership_history[2];
        assert_eq!(third.start, None);
        assert_eq!(third.end, IntervalEnd::Unreadable);
    }

    #[test]
    fn member_without_id_is_dropped() {
        let doc: MemberDocument = serde_json::from_value(json!({ "name": "Nobody" })).unwrap();
        assert!(doc.to_member().is_none());
    }

    #[test]
    fn report_counts_never_go_negative() {
        let doc: ReportDocument = serde_json::from_value(json!({
            "groupId": "g1",
            "reportDate": "2024-03-05T19:00:00Z",
            "attendance": { "m1": "present", "m2": "absent", "m3": true },
            "guestCount": -3,
            "offeringAmount": "abc"
        }))
        .unwrap();

        let report = doc.to_report("fallback");
        assert!(report.id.starts_with("import-"));
        assert_eq!(report.guest_count, 0);
        assert_eq!(report.offering_amount, 0.0);

        let attendance = report.attendance.unwrap();
        assert_eq!(attendance["m1"], AttendanceStatus::Present);
        assert_eq!(attendance["m2"], AttendanceStatus::NotPresent);
        assert_eq!(attendance["m3"], AttendanceStatus::NotPresent);
    }

    #[test]
    fn documents_without_id_get_the_same_id_every_time() {
        let value = json!({
            "groupId": "g1",
            "reportDate": "2024-03-05T19:00:00Z",
            "attendance": { "m1": "present" }
        });
        let first: ReportDocument = serde_json::from_value(value.clone()).unwrap();
        let second: ReportDocument = serde_json::from_value(value).unwrap();
        assert_eq!(first.stable_id(), second.stable_id());

        let same_instant: ReportDocument = serde_json::from_value(json!({
            "groupId": "g1",
            "reportDate": 1709665200000u64
        }))
        .unwrap();
        assert_eq!(first.stable_id(), same_instant.stable_id());

        let other_group: ReportDocument = serde_json::from_value(json!({
            "groupId": "g2",
            "reportDate": "2024-03-05T19:00:00Z"
        }))
        .unwrap();
        assert_ne!(first.stable_id(), other_group.stable_id());

        let explicit: ReportDocument =
            serde_json::from_value(json!({ "id": "r-7", "groupId": "g1" })).unwrap();
        assert_eq!(explicit.stable_id().as_deref(), Some("r-7"));
    }

    #[test]
    fn undated_documents_without_id_are_not_stored() {
        let doc: ReportDocument =
            serde_json::from_value(json!({ "groupId": "g1", "attendance": {} })).unwrap();
        assert!(doc.stable_id().is_none());
        assert!(StoredReport::from_document(&doc).is_none());
    }

    #[test]
    fn stored_reports_read_back_like_the_export() {
        let doc: ReportDocument = serde_json::from_value(json!({
            "groupId": "",
            "reportDate": "2024-03-05T19:00:00Z",
            "attendance": { "m1": "present" },
            "guestCount": "2",
            "offeringAmount": -5
        }))
        .unwrap();

        let stored = StoredReport::from_document(&doc).unwrap();
        assert_eq!(stored.group_id, None);
        assert_eq!(stored.guest_count, 2);
        assert_eq!(stored.offering_amount, 0.0);
        assert_eq!(stored.to_report(), doc.to_report("unused"));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        assert_eq!(parse_guest_count(Some(&json!("4"))), 4);
        assert_eq!(parse_guest_count(Some(&json!(2.9))), 2);
        assert_eq!(parse_amount(Some(&json!("125.50"))), 125.5);
        assert_eq!(parse_amount(None), 0.0);
    }

    #[test]
    fn non_object_attendance_is_absent() {
        assert!(parse_attendance(&json!(["m1"])).is_none());
        assert!(parse_attendance(&json!("m1")).is_none());
        assert!(parse_attendance(&json!({})).unwrap().is_empty());
    }

    #[test]
    fn snapshot_skips_unreadable_documents() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "members": [{ "id": "m1", "currentGroupId": "g1" }, "junk", { "name": "no id" }],
            "reports": [{ "id": "r1", "groupId": "g1", "reportDate": 1709665200000u64, "attendance": {} }, 7]
        }))
        .unwrap();

        assert_eq!(snapshot.members().len(), 1);
        let reports = snapshot.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].report_date.is_some());
    }
}
