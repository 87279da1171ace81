use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use connect_attendance::models::{AttendanceReport, Member};
use connect_attendance::snapshot::{self, MemberDocument, ReportDocument, Snapshot, StoredReport};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<(usize, usize)> {
    import_snapshot(pool, &demo_snapshot()?).await
}

/// Upserts every readable document of `snapshot`. Returns the number of
/// members and reports written.
pub async fn import_snapshot(pool: &PgPool, snapshot: &Snapshot) -> anyhow::Result<(usize, usize)> {
    let mut members_written = 0usize;
    for document in snapshot.member_documents() {
        if upsert_member(pool, &document).await? {
            members_written += 1;
        }
    }

    let mut reports_written = 0usize;
    for document in snapshot.report_documents() {
        if upsert_report(pool, &document).await? {
            reports_written += 1;
        }
    }

    info!(
        members = members_written,
        reports = reports_written,
        "imported snapshot"
    );
    Ok((members_written, reports_written))
}

async fn upsert_member(pool: &PgPool, document: &MemberDocument) -> anyhow::Result<bool> {
    let Some(member) = document.to_member() else {
        debug!("skipping member document without an id");
        return Ok(false);
    };
    let history = document
        .membership_history
        .clone()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    sqlx::query(
        r#"
        INSERT INTO connect_attendance.members (id, name, current_group_id, membership_history)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name,
            current_group_id = EXCLUDED.current_group_id,
            membership_history = EXCLUDED.membership_history,
            updated_at = now()
        "#,
    )
    .bind(&member.id)
    .bind(&member.name)
    .bind(&member.current_group_id)
    .bind(history)
    .execute(pool)
    .await?;

    Ok(true)
}

async fn upsert_report(pool: &PgPool, document: &ReportDocument) -> anyhow::Result<bool> {
    let Some(report) = StoredReport::from_document(document) else {
        debug!("skipping report document without an id or meeting date");
        return Ok(false);
    };

    // The meeting date is fixed once a report exists.
    sqlx::query(
        r#"
        INSERT INTO connect_attendance.attendance_reports
        (id, group_id, report_date, attendance, guest_count, offering_amount)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE
        SET group_id = EXCLUDED.group_id,
            attendance = EXCLUDED.attendance,
            guest_count = EXCLUDED.guest_count,
            offering_amount = EXCLUDED.offering_amount
        "#,
    )
    .bind(&report.id)
    .bind(&report.group_id)
    .bind(report.report_date)
    .bind(&report.attendance)
    .bind(report.guest_count)
    .bind(report.offering_amount)
    .execute(pool)
    .await?;

    Ok(true)
}

pub async fn fetch_members(pool: &PgPool) -> anyhow::Result<Vec<Member>> {
    let rows = sqlx::query(
        "SELECT id, name, current_group_id, membership_history \
         FROM connect_attendance.members ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let mut members = Vec::with_capacity(rows.len());
    for row in rows {
        let history: Value = row.get("membership_history");
        members.push(Member {
            id: row.get("id"),
            name: row.get("name"),
            current_group_id: row.get("current_group_id"),
            membership_history: snapshot::parse_history(&history),
        });
    }

    Ok(members)
}

pub async fn fetch_reports(
    pool: &PgPool,
    group_id: Option<&str>,
) -> anyhow::Result<Vec<AttendanceReport>> {
    let mut query = String::from(
        "SELECT id, group_id, report_date, attendance, guest_count, offering_amount \
         FROM connect_attendance.attendance_reports",
    );

    if group_id.is_some() {
        query.push_str(" WHERE group_id = $1");
    }
    query.push_str(" ORDER BY report_date, id");

    let mut rows = sqlx::query(&query);
    if let Some(value) = group_id {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut reports = Vec::with_capacity(records.len());

    for row in records {
        let stored = StoredReport {
            id: row.get("id"),
            group_id: row.get("group_id"),
            report_date: row.get("report_date"),
            attendance: row.get("attendance"),
            guest_count: row.get("guest_count"),
            offering_amount: row.get("offering_amount"),
        };
        reports.push(stored.to_report());
    }

    Ok(reports)
}

fn demo_snapshot() -> anyhow::Result<Snapshot> {
    let value = json!({
        "members": [
            {
                "id": "avery-lee",
                "name": "Avery Lee",
                "currentGroupId": "connect-north",
                "membershipHistory": [
                    { "groupId": "connect-north", "startDate": "2024-02-11T00:00:00Z", "endDate": null }
                ]
            },
            {
                "id": "jules-moreno",
                "name": "Jules Moreno",
                "currentGroupId": "connect-north"
            },
            {
                "id": "kiara-patel",
                "name": "Kiara Patel",
                "currentGroupId": "connect-south",
                "membershipHistory": [
                    { "groupId": "connect-north", "startDate": { "seconds": 1693526400, "nanoseconds": 0 }, "endDate": "2024-02-14T00:00:00Z" },
                    { "groupId": "connect-south", "startDate": 1707868800000u64, "endDate": null }
                ]
            },
            {
                "id": "marcus-okafor",
                "name": "Marcus Okafor",
                "currentGroupId": "connect-south",
                "membershipHistory": [
                    { "groupId": "connect-south", "startDate": "2023-10-01", "endDate": null }
                ]
            }
        ],
        "reports": [
            {
                "id": "seed-north-0204",
                "groupId": "connect-north",
                "reportDate": "2024-02-07T19:00:00Z",
                "attendance": { "avery-lee": "present", "jules-moreno": "present", "kiara-patel": "present" },
                "guestCount": 1,
                "offeringAmount": 45.0
            },
            {
                "id": "seed-south-0204",
                "groupId": "connect-south",
                "reportDate": "2024-02-08T19:00:00Z",
                "attendance": { "marcus-okafor": "present", "kiara-patel": "present" },
                "guestCount": 0,
                "offeringAmount": 30.0
            },
            {
                "id": "seed-north-0211",
                "groupId": "connect-north",
                "reportDate": "2024-02-14T19:00:00Z",
                "attendance": { "avery-lee": "present", "jules-moreno": "absent", "kiara-patel": "present" },
                "guestCount": 2,
                "offeringAmount": 52.5
            },
            {
                "id": "seed-south-0218",
                "groupId": "connect-south",
                "reportDate": "2024-02-22T19:00:00Z",
                "attendance": { "marcus-okafor": "present", "kiara-patel": "present" },
                "guestCount": 3,
                "offeringAmount": 61.0
            },
            {
                "id": "seed-north-0225",
                "groupId": "connect-north",
                "reportDate": "2024-02-28T19:00:00Z",
                "attendance": { "avery-lee": "present", "jules-moreno": "present" },
                "guestCount": 0,
                "offeringAmount": 40.0
            }
        ]
    });

    Ok(serde_json::from_value(value)?)
}
