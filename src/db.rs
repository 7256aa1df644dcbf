use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::RawReport;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let units = vec![
        (
            Uuid::parse_str("7b1f4c7e-52a3-4d0e-9c1f-1f9a2b6d4e01")?,
            "North Region",
        ),
        (
            Uuid::parse_str("2e8d9a10-6b44-4f6e-a2d3-7c5e90b1f302")?,
            "South Region",
        ),
        (
            Uuid::parse_str("c4a6e8f2-3d17-49b0-8e5a-0b2d6f8a1c03")?,
            "Digital Channels",
        ),
    ];

    for (id, name) in units {
        sqlx::query(
            r#"
            INSERT INTO report_analytics.units (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let reports = vec![
        (
            "seed-001",
            Some("North Region"),
            Some("press"),
            "approved",
            Some(82.0),
            date(2026, 7, 6)?,
        ),
        (
            "seed-002",
            Some("North Region"),
            Some("social_media"),
            "completed",
            Some(91.0),
            date(2026, 7, 14)?,
        ),
        (
            "seed-003",
            Some("South Region"),
            Some("press"),
            "approved",
            Some(74.0),
            date(2026, 7, 20)?,
        ),
        (
            "seed-004",
            Some("Digital Channels"),
            Some("social_media"),
            "rejected",
            Some(55.0),
            date(2026, 8, 3)?,
        ),
        (
            "seed-005",
            Some("South Region"),
            Some("outreach"),
            "pending_approval",
            None,
            date(2026, 8, 11)?,
        ),
        ("seed-006", None, None, "queued", None, date(2026, 8, 18)?),
    ];

    for (source_key, unit_name, indicator, status, score, created_at) in reports {
        let unit_id: Option<Uuid> = match unit_name {
            Some(name) => Some(
                sqlx::query("SELECT id FROM report_analytics.units WHERE name = $1")
                    .bind(name)
                    .fetch_one(pool)
                    .await?
                    .get("id"),
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO report_analytics.reports
            (id, unit_id, indicator_type, status, score, created_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(unit_id)
        .bind(indicator)
        .bind(status)
        .bind(score)
        .bind(created_at)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn date(year: i32, month: u32, day: u32) -> anyhow::Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0)
        .single()
        .context("invalid date")
}

/// Fetch the report collection for one aggregation window. Unit and
/// indicator filters are applied here, upstream of the engine; records with
/// no owning unit survive via the LEFT JOIN. `until` is exclusive and serves
/// the prior-window fetch.
pub async fn fetch_reports(
    pool: &PgPool,
    since: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
    unit: Option<&str>,
    indicator: Option<&str>,
) -> anyhow::Result<Vec<RawReport>> {
    let mut query = String::from(
        "SELECT r.id, u.name AS unit_name, r.indicator_type, r.status, \
         r.score, r.created_at, r.approved_at \
         FROM report_analytics.reports r \
         LEFT JOIN report_analytics.units u ON u.id = r.unit_id \
         WHERE r.created_at >= $1",
    );

    let mut placeholder = 2;
    if until.is_some() {
        query.push_str(&format!(" AND r.created_at < ${placeholder}"));
        placeholder += 1;
    }
    if unit.is_some() {
        query.push_str(&format!(" AND u.name = ${placeholder}"));
        placeholder += 1;
    }
    if indicator.is_some() {
        query.push_str(&format!(" AND r.indicator_type = ${placeholder}"));
    }
    query.push_str(" ORDER BY r.created_at");

    let mut rows = sqlx::query(&query).bind(since);
    if let Some(value) = until {
        rows = rows.bind(value);
    }
    if let Some(value) = unit {
        rows = rows.bind(value);
    }
    if let Some(value) = indicator {
        rows = rows.bind(value);
    }

    let records = rows
        .fetch_all(pool)
        .await
        .context("failed to fetch report records")?;
    let mut reports = Vec::new();

    for row in records {
        reports.push(RawReport {
            id: row.get("id"),
            unit_name: row.get("unit_name"),
            indicator_type: row.get("indicator_type"),
            status: row.get("status"),
            score: row.get("score"),
            created_at: row.get("created_at"),
            approved_at: row.get("approved_at"),
        });
    }

    Ok(reports)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        unit_name: Option<String>,
        indicator_type: Option<String>,
        status: String,
        score: Option<f64>,
        created_at: DateTime<Utc>,
        approved_at: Option<DateTime<Utc>>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;

        let unit_id: Option<Uuid> = match row.unit_name.as_deref() {
            Some(name) if !name.trim().is_empty() => Some(
                sqlx::query(
                    r#"
                    INSERT INTO report_analytics.units (id, name)
                    VALUES ($1, $2)
                    ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                    RETURNING id
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(name)
                .fetch_one(pool)
                .await?
                .get("id"),
            ),
            _ => None,
        };

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO report_analytics.reports
            (id, unit_id, indicator_type, status, score, created_at, approved_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(unit_id)
        .bind(&row.indicator_type)
        .bind(&row.status)
        .bind(row.score)
        .bind(row.created_at)
        .bind(row.approved_at)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
