//! Decision cache queries.
//!
//! A cached decision is spread across four tables. Reads load each level
//! with one batch query keyed by the parent ids, all inside a read-only
//! repeatable-read transaction. Writes run inside a single transaction that
//! holds a row lock on the top-level record.

use std::collections::HashMap;

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgConnection, PgPool};
use time::OffsetDateTime;

use cptlookup_core::{Condition, DecisionResponse, ProcedureDetermination, SiteOfService};
use cptlookup_storage::{StalenessWindow, StorageError, UpsertOutcome};

use crate::error::query_error;

type DecisionRow = (
    i64,
    String,
    String,
    Option<String>,
    OffsetDateTime,
    OffsetDateTime,
);
type DeterminationRow = (i64, String, String, String);
type SiteRow = (i64, i64, String, String);
type ConditionRow = (i64, i64, String, String);

/// Must be the first statement of the transaction.
const SNAPSHOT_READ: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

/// Loads the earliest decision stored for a jurisdiction.
///
/// All levels are read from one snapshot, so a concurrent reset of the same
/// record is seen either entirely or not at all.
pub async fn get(
    pool: &PgPool,
    policy_issue_state: &str,
    procedure_codes: &[String],
) -> Result<DecisionResponse, StorageError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| StorageError::transaction_error(format!("Failed to begin: {e}")))?;
    query(SNAPSHOT_READ)
        .execute(&mut *tx)
        .await
        .map_err(query_error("Failed to start snapshot read"))?;

    let response = load(&mut *tx, policy_issue_state, procedure_codes).await?;
    commit(tx).await?;
    Ok(response)
}

async fn load(
    conn: &mut PgConnection,
    policy_issue_state: &str,
    procedure_codes: &[String],
) -> Result<DecisionResponse, StorageError> {
    let row: Option<DecisionRow> = query_as(
        r#"SELECT id, product_category, policy_issue_state, diagnosis_code, created_at, updated_at
           FROM decision_responses
           WHERE policy_issue_state = $1
           ORDER BY id
           LIMIT 1"#,
    )
    .bind(policy_issue_state)
    .fetch_optional(&mut *conn)
    .await
    .map_err(query_error("Failed to load decision"))?;

    let Some((id, product_category, state, diagnosis_code, created_at, updated_at)) = row else {
        return Err(StorageError::no_record(policy_issue_state));
    };

    let determinations: Vec<DeterminationRow> = if procedure_codes.is_empty() {
        query_as(
            r#"SELECT id, procedure_code, procedure_code_desc, decision_summary_text
               FROM procedure_determinations
               WHERE decision_response_id = $1
               ORDER BY id"#,
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await
    } else {
        query_as(
            r#"SELECT id, procedure_code, procedure_code_desc, decision_summary_text
               FROM procedure_determinations
               WHERE decision_response_id = $1 AND procedure_code = ANY($2)
               ORDER BY id"#,
        )
        .bind(id)
        .bind(procedure_codes)
        .fetch_all(&mut *conn)
        .await
    }
    .map_err(query_error("Failed to load determinations"))?;

    if !procedure_codes.is_empty() && determinations.is_empty() {
        return Err(StorageError::no_matching_procedures(
            policy_issue_state,
            procedure_codes,
        ));
    }

    let determination_ids: Vec<i64> = determinations.iter().map(|row| row.0).collect();
    let sites: Vec<SiteRow> = query_as(
        r#"SELECT id, procedure_determination_id, site_of_service_type, decision_code
           FROM sites_of_service
           WHERE procedure_determination_id = ANY($1)
           ORDER BY id"#,
    )
    .bind(&determination_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_error("Failed to load sites of service"))?;

    let site_ids: Vec<i64> = sites.iter().map(|row| row.0).collect();
    let conditions: Vec<ConditionRow> = query_as(
        r#"SELECT id, site_of_service_id, condition_name, condition_detail
           FROM service_conditions
           WHERE site_of_service_id = ANY($1)
           ORDER BY id"#,
    )
    .bind(&site_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(query_error("Failed to load conditions"))?;

    let mut conditions_by_site: HashMap<i64, Vec<Condition>> = HashMap::new();
    for (id, site_id, name, detail) in conditions {
        conditions_by_site.entry(site_id).or_default().push(Condition {
            id: Some(id),
            condition_name: name,
            condition_detail: detail,
        });
    }

    let mut sites_by_determination: HashMap<i64, Vec<SiteOfService>> = HashMap::new();
    for (id, determination_id, site_type, decision_code) in sites {
        sites_by_determination
            .entry(determination_id)
            .or_default()
            .push(SiteOfService {
                id: Some(id),
                site_of_service_type: site_type,
                decision_code,
                conditions: conditions_by_site.remove(&id).unwrap_or_default(),
            });
    }

    let preliminary_determinations = determinations
        .into_iter()
        .map(|(id, code, description, summary)| ProcedureDetermination {
            id: Some(id),
            procedure_code: code,
            procedure_description: description,
            decision_summary_text: summary,
            is_gold_card: false,
            sites_of_service: sites_by_determination.remove(&id).unwrap_or_default(),
        })
        .collect();

    Ok(DecisionResponse {
        id: Some(id),
        product_category,
        policy_issue_state: state,
        diagnosis_code,
        disclaimer_text: String::new(),
        preliminary_determinations,
        created_at: Some(created_at),
        updated_at: Some(updated_at),
    })
}

/// Merges `response` into the cache under one transaction.
pub async fn upsert(
    pool: &PgPool,
    staleness: StalenessWindow,
    response: &DecisionResponse,
    now: OffsetDateTime,
) -> Result<UpsertOutcome, StorageError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| StorageError::transaction_error(format!("Failed to begin: {e}")))?;

    let existing = match lock_existing(&mut *tx, response).await? {
        Some(existing) => Some(existing),
        None => {
            let inserted: Option<i64> = query_scalar(
                r#"INSERT INTO decision_responses
                       (product_category, policy_issue_state, diagnosis_code, created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $4)
                   ON CONFLICT (product_category, policy_issue_state) DO NOTHING
                   RETURNING id"#,
            )
            .bind(&response.product_category)
            .bind(&response.policy_issue_state)
            .bind(&response.diagnosis_code)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error("Failed to insert decision"))?;

            match inserted {
                Some(id) => {
                    insert_determinations(&mut *tx, id, &response.preliminary_determinations, now)
                        .await?;
                    commit(tx).await?;
                    return Ok(UpsertOutcome::Inserted);
                }
                // A concurrent writer inserted the key first; merge into its row.
                None => lock_existing(&mut *tx, response).await?,
            }
        }
    };

    let Some((id, updated_at)) = existing else {
        return Err(StorageError::transaction_error(format!(
            "decision {} vanished during upsert",
            response.key()
        )));
    };

    let outcome = if staleness.is_stale(Some(updated_at), now) {
        query("DELETE FROM procedure_determinations WHERE decision_response_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(query_error("Failed to clear stale determinations"))?;

        query(
            r#"UPDATE decision_responses
               SET product_category = $2, diagnosis_code = $3, updated_at = $4
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&response.product_category)
        .bind(&response.diagnosis_code)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(query_error("Failed to reset decision"))?;

        UpsertOutcome::Reset
    } else {
        query("UPDATE decision_responses SET updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(query_error("Failed to touch decision"))?;

        UpsertOutcome::Appended
    };

    insert_determinations(&mut *tx, id, &response.preliminary_determinations, now).await?;
    commit(tx).await?;

    Ok(outcome)
}

async fn lock_existing(
    conn: &mut PgConnection,
    response: &DecisionResponse,
) -> Result<Option<(i64, OffsetDateTime)>, StorageError> {
    query_as(
        r#"SELECT id, updated_at
           FROM decision_responses
           WHERE product_category = $1 AND policy_issue_state = $2
           FOR UPDATE"#,
    )
    .bind(&response.product_category)
    .bind(&response.policy_issue_state)
    .fetch_optional(conn)
    .await
    .map_err(query_error("Failed to lock decision"))
}

async fn insert_determinations(
    conn: &mut PgConnection,
    decision_id: i64,
    determinations: &[ProcedureDetermination],
    now: OffsetDateTime,
) -> Result<(), StorageError> {
    for determination in determinations {
        let determination_id: i64 = query_scalar(
            r#"INSERT INTO procedure_determinations
                   (decision_response_id, procedure_code, procedure_code_desc,
                    decision_summary_text, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $5)
               RETURNING id"#,
        )
        .bind(decision_id)
        .bind(&determination.procedure_code)
        .bind(&determination.procedure_description)
        .bind(&determination.decision_summary_text)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(query_error("Failed to insert determination"))?;

        for site in &determination.sites_of_service {
            let site_id: i64 = query_scalar(
                r#"INSERT INTO sites_of_service
                       (procedure_determination_id, site_of_service_type, decision_code,
                        created_at, updated_at)
                   VALUES ($1, $2, $3, $4, $4)
                   RETURNING id"#,
            )
            .bind(determination_id)
            .bind(&site.site_of_service_type)
            .bind(&site.decision_code)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .map_err(query_error("Failed to insert site of service"))?;

            for condition in &site.conditions {
                query(
                    r#"INSERT INTO service_conditions
                           (site_of_service_id, condition_name, condition_detail,
                            created_at, updated_at)
                       VALUES ($1, $2, $3, $4, $4)"#,
                )
                .bind(site_id)
                .bind(&condition.condition_name)
                .bind(&condition.condition_detail)
                .bind(now)
                .execute(&mut *conn)
                .await
                .map_err(query_error("Failed to insert condition"))?;
            }
        }
    }

    Ok(())
}

async fn commit(tx: sqlx_postgres::PgTransaction<'_>) -> Result<(), StorageError> {
    tx.commit()
        .await
        .map_err(|e| StorageError::transaction_error(format!("Failed to commit: {e}")))
}
