//! Transactional bulk persistence of normalized patent records.

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::query_builder::Separated;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use patent_core::{defaults, Error, PatentRecord, PatentStore, Result};

/// PostgreSQL implementation of [`PatentStore`].
///
/// One `save` call is one transaction. Records are written in batches, and
/// within a batch tables are written parent-first: patents, inventors,
/// inventor links, assignees, assignee links, jurisdictions, jurisdiction
/// links, transaction links, bundle links, claims.
#[derive(Clone)]
pub struct PgPatentRepository {
    pool: PgPool,
    batch_size: usize,
}

impl PgPatentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            batch_size: defaults::PERSIST_BATCH_SIZE,
        }
    }

    /// Records per batch (at least one).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PatentStore for PgPatentRepository {
    #[instrument(
        skip(self, records),
        fields(subsystem = "db", component = "patents", op = "save", result_count = records.len())
    )]
    async fn save(
        &self,
        records: &[PatentRecord],
        transaction_id: Uuid,
        bundle_id: Uuid,
    ) -> Result<()> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            if let Err(e) = insert_batch(&mut tx, batch, transaction_id, bundle_id).await {
                warn!(batch = index, error = %e, "Batch insert failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "Rollback failed");
                }
                return Err(e);
            }
            debug!(batch = index, batch_len = batch.len(), "Batch written");
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            %transaction_id,
            %bundle_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Patents saved"
        );
        Ok(())
    }
}

async fn insert_batch(
    conn: &mut PgConnection,
    batch: &[PatentRecord],
    transaction_id: Uuid,
    bundle_id: Uuid,
) -> Result<()> {
    insert_patents(conn, batch).await?;

    let inventors = unique_names(batch.iter().flat_map(|r| &r.inventors).map(|i| &i.full_name));
    insert_names(conn, "inventor", "full_name", &inventors).await?;
    let inventor_links: Vec<(Uuid, &String)> = batch
        .iter()
        .flat_map(|r| &r.inventor_links)
        .map(|l| (l.patent_id, &l.inventor_name))
        .collect();
    insert_links(conn, "patentinventorlink", "inventor_name", &inventor_links).await?;

    let assignees = unique_names(batch.iter().flat_map(|r| &r.assignees).map(|a| &a.name));
    insert_names(conn, "standardizedcurrentassignee", "name", &assignees).await?;
    let assignee_links: Vec<(Uuid, &String)> = batch
        .iter()
        .flat_map(|r| &r.assignee_links)
        .map(|l| (l.patent_id, &l.assignee_name))
        .collect();
    insert_links(
        conn,
        "patentstandardizedcurrentassigneelink",
        "standardized_current_assignee_name",
        &assignee_links,
    )
    .await?;

    let jurisdictions =
        unique_names(batch.iter().flat_map(|r| &r.jurisdictions).map(|j| &j.name));
    insert_names(conn, "simplefamilyjurisdiction", "name", &jurisdictions).await?;
    let jurisdiction_links: Vec<(Uuid, &String)> = batch
        .iter()
        .flat_map(|r| &r.jurisdiction_links)
        .map(|l| (l.patent_id, &l.jurisdiction_name))
        .collect();
    insert_links(
        conn,
        "patentsimplefamilyjurisdictionlink",
        "family_jurisdiction_name",
        &jurisdiction_links,
    )
    .await?;

    let patent_ids: Vec<Uuid> = batch.iter().map(|r| r.patent.id).collect();
    insert_job_links(conn, "patenttransactionlink", "transaction_id", &patent_ids, transaction_id)
        .await?;
    insert_job_links(conn, "bundlepatentlink", "bundle_id", &patent_ids, bundle_id).await?;

    insert_claims(conn, batch).await?;
    Ok(())
}

/// Execute a multi-row INSERT, split so no statement exceeds the bind
/// parameter limit.
async fn insert_rows<T, F>(
    conn: &mut PgConnection,
    table: &'static str,
    prefix: &str,
    suffix: &str,
    rows: &[T],
    binds_per_row: usize,
    mut push_row: F,
) -> Result<()>
where
    F: FnMut(Separated<'_, 'static, Postgres, &'static str>, &T),
{
    if rows.is_empty() {
        return Ok(());
    }

    let rows_per_statement = (defaults::PG_MAX_BIND_PARAMS / binds_per_row).max(1);
    for chunk in rows.chunks(rows_per_statement) {
        let mut builder: QueryBuilder<'static, Postgres> = QueryBuilder::new(prefix);
        builder.push_values(chunk, |b, row| push_row(b, row));
        builder.push(suffix);
        builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|source| Error::Persist { table, source })?;
    }

    debug!(table, row_count = rows.len(), "Inserted rows");
    Ok(())
}

async fn insert_patents(conn: &mut PgConnection, batch: &[PatentRecord]) -> Result<()> {
    insert_rows(
        conn,
        "patent",
        "INSERT INTO patent (id, title, abstract, description, brief_description_of_drawings, \
         cpc, earliest_priority_date, estimated_expiry_date, application_date, \
         application_number, issue_date, publication_date, publication_number, \
         simple_legal_status, authority, inpadoc_family, inpadoc_family_application_count, \
         inpadoc_family_jurisdiction, inpadoc_family_jurisdiction_count, \
         count_of_cited_by_patents, first_claim, total_number_of_claims, \
         total_number_of_independent_claims, file_url) ",
        "",
        batch,
        24,
        |mut b, record| {
            let p = &record.patent;
            b.push_bind(p.id)
                .push_bind(p.title.clone())
                .push_bind(p.abstract_text.clone())
                .push_bind(p.description.clone())
                .push_bind(p.brief_description_of_drawings.clone())
                .push_bind(p.cpc.clone())
                .push_bind(p.earliest_priority_date)
                .push_bind(p.estimated_expiry_date)
                .push_bind(p.application_date)
                .push_bind(p.application_number.clone())
                .push_bind(p.issue_date)
                .push_bind(p.publication_date)
                .push_bind(p.publication_number.clone())
                .push_bind(p.simple_legal_status.clone())
                .push_bind(p.authority.clone())
                .push_bind(p.inpadoc_family.clone())
                .push_bind(p.inpadoc_family_application_count)
                .push_bind(p.inpadoc_family_jurisdiction.clone())
                .push_bind(p.inpadoc_family_jurisdiction_count)
                .push_bind(p.count_of_cited_by_patents)
                .push_bind(p.first_claim.clone())
                .push_bind(p.total_number_of_claims)
                .push_bind(p.total_number_of_independent_claims)
                .push_bind(p.file_url.clone());
        },
    )
    .await
}

/// Names may repeat across patents and runs, so conflicts are ignored.
async fn insert_names(
    conn: &mut PgConnection,
    table: &'static str,
    column: &str,
    names: &[String],
) -> Result<()> {
    insert_rows(
        conn,
        table,
        &format!("INSERT INTO {} ({}) ", table, column),
        " ON CONFLICT DO NOTHING",
        names,
        1,
        |mut b, name| {
            b.push_bind(name.clone());
        },
    )
    .await
}

async fn insert_links(
    conn: &mut PgConnection,
    table: &'static str,
    name_column: &str,
    links: &[(Uuid, &String)],
) -> Result<()> {
    insert_rows(
        conn,
        table,
        &format!("INSERT INTO {} (patent_id, {}) ", table, name_column),
        "",
        links,
        2,
        |mut b, (patent_id, name)| {
            b.push_bind(*patent_id).push_bind(name.to_string());
        },
    )
    .await
}

async fn insert_job_links(
    conn: &mut PgConnection,
    table: &'static str,
    id_column: &str,
    patent_ids: &[Uuid],
    job_id: Uuid,
) -> Result<()> {
    insert_rows(
        conn,
        table,
        &format!("INSERT INTO {} (patent_id, {}) ", table, id_column),
        "",
        patent_ids,
        2,
        |mut b, patent_id| {
            b.push_bind(*patent_id).push_bind(job_id);
        },
    )
    .await
}

async fn insert_claims(conn: &mut PgConnection, batch: &[PatentRecord]) -> Result<()> {
    let claims: Vec<_> = batch.iter().flat_map(|r| &r.claims).collect();
    insert_rows(
        conn,
        "claim",
        "INSERT INTO claim (patent_id, claim_number, independent_claim, dependent_claims) ",
        "",
        &claims,
        4,
        |mut b, claim| {
            b.push_bind(claim.patent_id)
                .push_bind(claim.claim_number)
                .push_bind(claim.independent_claim.clone())
                .push_bind(claim.dependent_claims.clone());
        },
    )
    .await
}

/// First-seen order, duplicates removed.
fn unique_names<'a>(names: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}
