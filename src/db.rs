use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    ProjectSnapshot, ProjectStatus, SupplyLine, TeamMember, WorkOrderSnapshot,
};

const PROJECT_COLUMNS: &str = "id, name, priority, status, start_date, end_date, \
     actual_start_date, actual_end_date, actual_cost";

const WORK_ORDER_COLUMNS: &str = "id, project_id, status, end_date, \
     estimated_budget, actual_cost, actual_start_date, actual_end_date";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn project_from_row(row: &PgRow) -> anyhow::Result<ProjectSnapshot> {
    Ok(ProjectSnapshot {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        priority: row.try_get("priority")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        planned_start: row.try_get("start_date")?,
        planned_end: row.try_get("end_date")?,
        actual_start: row.try_get("actual_start_date")?,
        actual_end: row.try_get("actual_end_date")?,
        actual_cost: row.try_get("actual_cost")?,
    })
}

fn work_order_from_row(row: &PgRow) -> anyhow::Result<WorkOrderSnapshot> {
    Ok(WorkOrderSnapshot {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        planned_end: row.try_get("end_date")?,
        estimated_budget: row.try_get("estimated_budget")?,
        actual_cost: row.try_get("actual_cost")?,
        actual_start: row.try_get("actual_start_date")?,
        actual_end: row.try_get("actual_end_date")?,
    })
}

pub async fn fetch_project(pool: &PgPool, project_id: Uuid) -> anyhow::Result<ProjectSnapshot> {
    let query = format!("SELECT {PROJECT_COLUMNS} FROM field_progress.projects WHERE id = $1");
    let row = sqlx::query(&query)
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("project {project_id} not found"))?;
    project_from_row(&row)
}

pub async fn fetch_projects(
    pool: &PgPool,
    status: Option<ProjectStatus>,
) -> anyhow::Result<Vec<ProjectSnapshot>> {
    let mut query = format!("SELECT {PROJECT_COLUMNS} FROM field_progress.projects");
    if status.is_some() {
        query.push_str(" WHERE status = $1");
    }
    query.push_str(" ORDER BY name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = status {
        rows = rows.bind(value.as_str());
    }

    rows.fetch_all(pool)
        .await?
        .iter()
        .map(project_from_row)
        .collect()
}

pub async fn fetch_work_orders(
    pool: &PgPool,
    project_ids: &[Uuid],
) -> anyhow::Result<Vec<WorkOrderSnapshot>> {
    let query = format!(
        "SELECT {WORK_ORDER_COLUMNS} FROM field_progress.work_orders WHERE project_id = ANY($1)"
    );
    let orders = sqlx::query(&query)
        .bind(project_ids)
        .fetch_all(pool)
        .await?
        .iter()
        .map(work_order_from_row)
        .collect::<anyhow::Result<Vec<_>>>()?;
    debug!(projects = project_ids.len(), orders = orders.len(), "loaded work orders");
    Ok(orders)
}

pub async fn fetch_team(pool: &PgPool, project_id: Uuid) -> anyhow::Result<Vec<TeamMember>> {
    let rows = sqlx::query(
        "SELECT project_id, user_id, is_active FROM field_progress.project_members \
         WHERE project_id = $1",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    let mut team = Vec::new();
    for row in rows {
        team.push(TeamMember {
            project_id: row.try_get("project_id")?,
            user_id: row.try_get("user_id")?,
            is_active: row.try_get("is_active")?,
        });
    }
    Ok(team)
}

pub async fn fetch_supplies(
    pool: &PgPool,
    project_ids: &[Uuid],
) -> anyhow::Result<Vec<SupplyLine>> {
    let rows = sqlx::query(
        "SELECT s.work_order_id, s.status, s.cost \
         FROM field_progress.supplies s \
         JOIN field_progress.work_orders w ON w.id = s.work_order_id \
         WHERE w.project_id = ANY($1)",
    )
    .bind(project_ids)
    .fetch_all(pool)
    .await?;

    let mut supplies = Vec::new();
    for row in rows {
        supplies.push(SupplyLine {
            work_order_id: row.try_get("work_order_id")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            cost: row.try_get("cost")?,
        });
    }
    debug!(projects = project_ids.len(), lines = supplies.len(), "loaded supplies");
    Ok(supplies)
}

async fn upsert_project(
    pool: &PgPool,
    name: &str,
    status: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO field_progress.projects (id, name, status, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (name) DO UPDATE
        SET start_date = EXCLUDED.start_date, end_date = EXCLUDED.end_date
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(status)
    .bind(start)
    .bind(end)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).context("invalid date");

    let project_id = upsert_project(
        pool,
        "Harbor Street Duplex",
        "in_progress",
        date(2026, 1, 5)?,
        date(2026, 6, 30)?,
    )
    .await?;

    sqlx::query(
        "UPDATE field_progress.projects \
         SET priority = 'high', actual_start_date = $2, actual_cost = $3 WHERE id = $1",
    )
    .bind(project_id)
    .bind(date(2026, 1, 12)?)
    .bind(Decimal::new(4_250_000, 2))
    .execute(pool)
    .await?;

    let orders = vec![
        ("seed-wo-001", "Site preparation", "completed", 5, 20, 1_200_000, Some(1_310_000)),
        ("seed-wo-002", "Foundation pour", "completed", 21, 45, 2_800_000, Some(2_650_000)),
        ("seed-wo-003", "Framing", "in_progress", 46, 90, 3_500_000, Some(940_000)),
        ("seed-wo-004", "Electrical rough-in", "pending", 91, 120, 1_800_000, None),
        ("seed-wo-005", "Plumbing rough-in", "on_hold", 91, 120, 1_500_000, None),
        ("seed-wo-006", "Solar prewire", "cancelled", 100, 110, 600_000, None),
    ];

    let base = date(2026, 1, 1)?;
    for (source_key, name, status, start, end, estimated, actual) in orders {
        let result = sqlx::query(
            r#"
            INSERT INTO field_progress.work_orders
            (id, project_id, name, status, start_date, end_date, estimated_budget, actual_cost, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(name)
        .bind(status)
        .bind(base + chrono::Duration::days(start))
        .bind(base + chrono::Duration::days(end))
        .bind(Decimal::new(estimated, 2))
        .bind(actual.map(|cents| Decimal::new(cents, 2)))
        .bind(source_key)
        .execute(pool)
        .await?;
        debug!(source_key, inserted = result.rows_affected(), "seeded work order");
    }

    for (user_id, is_active) in [
        ("6f1f0a52-3c1d-4a55-9a0e-0b7c3d1a9e11", true),
        ("b8e2c4f0-1d7a-4f3b-8c55-2a9e6d4f7b22", true),
        ("2c9d7e13-5b4a-4e8f-a1c6-7d3b9f0e5c33", false),
    ] {
        sqlx::query(
            r#"
            INSERT INTO field_progress.project_members (project_id, user_id, is_active)
            VALUES ($1, $2, $3)
            ON CONFLICT (project_id, user_id) DO UPDATE SET is_active = EXCLUDED.is_active
            "#,
        )
        .bind(project_id)
        .bind(Uuid::parse_str(user_id)?)
        .bind(is_active)
        .execute(pool)
        .await?;
    }

    let framing: Uuid =
        sqlx::query("SELECT id FROM field_progress.work_orders WHERE source_key = $1")
            .bind("seed-wo-003")
            .fetch_one(pool)
            .await?
            .get("id");

    sqlx::query("DELETE FROM field_progress.supplies WHERE work_order_id = $1")
        .bind(framing)
        .execute(pool)
        .await?;
    for (name, status, cents) in [
        ("Lumber package", "approved", 620_000),
        ("Hurricane ties", "pending", 48_000),
        ("Sheathing upgrade", "rejected", 150_000),
    ] {
        sqlx::query(
            r#"
            INSERT INTO field_progress.supplies (id, work_order_id, name, status, cost)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(framing)
        .bind(name)
        .bind(status)
        .bind(Decimal::new(cents, 2))
        .execute(pool)
        .await?;
    }

    info!(%project_id, "seed data ready");
    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        project_name: String,
        project_start: NaiveDate,
        project_end: NaiveDate,
        name: String,
        status: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        estimated_budget: Option<Decimal>,
        actual_cost: Option<Decimal>,
        actual_start_date: Option<NaiveDate>,
        actual_end_date: Option<NaiveDate>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let status: crate::models::WorkOrderStatus = row.status.parse()?;
        let project_id = upsert_project(
            pool,
            &row.project_name,
            ProjectStatus::Planning.as_str(),
            row.project_start,
            row.project_end,
        )
        .await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO field_progress.work_orders
            (id, project_id, name, status, start_date, end_date, estimated_budget,
             actual_cost, actual_start_date, actual_end_date, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(&row.name)
        .bind(status.as_str())
        .bind(row.start_date)
        .bind(row.end_date)
        .bind(row.estimated_budget)
        .bind(row.actual_cost)
        .bind(row.actual_start_date)
        .bind(row.actual_end_date)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
