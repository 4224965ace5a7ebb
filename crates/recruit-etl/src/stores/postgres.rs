//! PostgreSQL adapters
//!
//! - [`PgRequisitionSource`]: requisitions joined with clients
//! - [`PgDocumentSource`]: candidate and communication documents stored as
//!   JSONB bodies next to an indexed timestamp column
//! - [`PgMetricsSink`]: batched upserts into `requisition_metrics` and
//!   `skill_metrics` inside one transaction

use async_trait::async_trait;
use recruit_common::DateRange;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info, warn};

use super::{Collection, DocumentSource, MetricsSink, RequisitionSource};
use crate::error::{EtlError, EtlResult};
use crate::models::{ExtractFilters, PageRequest, RequisitionMetric, RequisitionRow, SkillMetric};

/// Rows per INSERT statement, well below the 65,535 bind parameter limit
const UPSERT_CHUNK_SIZE: usize = 1000;

fn page_binds(page: PageRequest) -> EtlResult<(i64, i64)> {
    let limit = i64::try_from(page.limit)
        .map_err(|_| EtlError::validation(format!("page limit {} out of range", page.limit)))?;
    let offset = i64::try_from(page.offset)
        .map_err(|_| EtlError::validation(format!("page offset {} out of range", page.offset)))?;
    Ok((limit, offset))
}

// ============================================================================
// Requisition Source
// ============================================================================

pub struct PgRequisitionSource {
    db: PgPool,
}

impl PgRequisitionSource {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RequisitionSource for PgRequisitionSource {
    async fn fetch_requisitions(
        &self,
        range: &DateRange,
        filters: &ExtractFilters,
        page: PageRequest,
    ) -> EtlResult<Vec<RequisitionRow>> {
        let (limit, offset) = page_binds(page)?;

        let rows = sqlx::query_as::<_, RequisitionRow>(
            r#"
            SELECT
                r.id, r.title, r.status,
                c.id AS client_id, c.name AS client_name, c.industry AS client_industry,
                r.satisfaction_score, r.created_at, r.filled_at, r.required_skills
            FROM requisitions r
            JOIN clients c ON c.id = r.client_id
            WHERE r.created_at BETWEEN $1 AND $2
              AND ($3::text IS NULL OR r.client_id = $3)
            ORDER BY r.created_at, r.id
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(range.start())
        .bind(range.end())
        .bind(filters.client_id.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .map_err(|e| EtlError::extraction_from("Failed to fetch requisitions", e))?;

        debug!(offset, returned = rows.len(), "Fetched requisition page");
        Ok(rows)
    }
}

// ============================================================================
// Document Source
// ============================================================================

pub struct PgDocumentSource {
    db: PgPool,
}

impl PgDocumentSource {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentSource for PgDocumentSource {
    async fn scan(
        &self,
        collection: Collection,
        range: &DateRange,
        page: PageRequest,
    ) -> EtlResult<Vec<serde_json::Value>> {
        let (limit, offset) = page_binds(page)?;

        // Table and column names come from the closed Collection enum.
        let sql = format!(
            r#"SELECT body FROM {table} WHERE "{field}" BETWEEN $1 AND $2 ORDER BY "{field}", id LIMIT $3 OFFSET $4"#,
            table = collection.name(),
            field = collection.time_field(),
        );

        let docs: Vec<serde_json::Value> = sqlx::query_scalar(&sql)
            .bind(range.start())
            .bind(range.end())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await
            .map_err(|e| EtlError::extraction_from(&format!("Failed to scan {}", collection), e))?;

        debug!(%collection, offset, returned = docs.len(), "Scanned document page");
        Ok(docs)
    }
}

// ============================================================================
// Metrics Sink
// ============================================================================

pub struct PgMetricsSink {
    db: PgPool,
}

impl PgMetricsSink {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn upsert_requisition_metrics(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[RequisitionMetric],
    ) -> Result<u64, sqlx::Error> {
        let mut affected = 0;
        for chunk in rows.chunks(UPSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO requisition_metrics (id, requisition_id, time_to_hire, fill_rate, satisfaction_score, created_at) ",
            );

            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(&row.requisition_id)
                    .push_bind(row.time_to_hire)
                    .push_bind(row.fill_rate)
                    .push_bind(row.satisfaction_score)
                    .push_bind(row.created_at);
            });

            query_builder.push(
                r#"
                ON CONFLICT (id) DO UPDATE SET
                    requisition_id = EXCLUDED.requisition_id,
                    time_to_hire = EXCLUDED.time_to_hire,
                    fill_rate = EXCLUDED.fill_rate,
                    satisfaction_score = EXCLUDED.satisfaction_score,
                    created_at = EXCLUDED.created_at
                "#,
            );

            affected += query_builder.build().execute(&mut **tx).await?.rows_affected();
        }
        Ok(affected)
    }

    async fn upsert_skill_metrics(
        tx: &mut Transaction<'_, Postgres>,
        rows: &[SkillMetric],
    ) -> Result<u64, sqlx::Error> {
        let mut affected = 0;
        for chunk in rows.chunks(UPSERT_CHUNK_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO skill_metrics (id, skill_name, demand_count, growth_rate, created_at) ",
            );

            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(&row.skill_name)
                    .push_bind(row.demand_count)
                    .push_bind(row.growth_rate)
                    .push_bind(row.created_at);
            });

            query_builder.push(
                r#"
                ON CONFLICT (id) DO UPDATE SET
                    skill_name = EXCLUDED.skill_name,
                    demand_count = EXCLUDED.demand_count,
                    growth_rate = EXCLUDED.growth_rate,
                    created_at = EXCLUDED.created_at
                "#,
            );

            affected += query_builder.build().execute(&mut **tx).await?.rows_affected();
        }
        Ok(affected)
    }

    async fn write_in_transaction(
        tx: &mut Transaction<'_, Postgres>,
        metrics: &[RequisitionMetric],
        skills: &[SkillMetric],
    ) -> Result<u64, sqlx::Error> {
        let requisition_rows = Self::upsert_requisition_metrics(tx, metrics).await?;
        let skill_rows = Self::upsert_skill_metrics(tx, skills).await?;
        Ok(requisition_rows + skill_rows)
    }
}

#[async_trait]
impl MetricsSink for PgMetricsSink {
    async fn write_metrics(
        &self,
        metrics: &[RequisitionMetric],
        skills: &[SkillMetric],
    ) -> EtlResult<u64> {
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| EtlError::load_from("Failed to begin transaction", e))?;

        match Self::write_in_transaction(&mut tx, metrics, skills).await {
            Ok(written) => {
                tx.commit()
                    .await
                    .map_err(|e| EtlError::load_from("Failed to commit transaction", e))?;
                info!(
                    requisition_rows = metrics.len(),
                    skill_rows = skills.len(),
                    written,
                    "Committed metric rows"
                );
                Ok(written)
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(EtlError::load_from("Failed to write metric rows", e))
            },
        }
    }
}
