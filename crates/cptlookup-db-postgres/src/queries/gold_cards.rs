//! Gold-card list queries.

use std::collections::HashSet;

use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;

use cptlookup_storage::StorageError;

use crate::error::query_error;

/// Returns the members of `codes` present in the gold-card table.
pub async fn find_existing(
    pool: &PgPool,
    codes: &[String],
) -> Result<HashSet<String>, StorageError> {
    if codes.is_empty() {
        return Ok(HashSet::new());
    }

    let found: Vec<String> = query_scalar("SELECT code FROM gold_card_codes WHERE code = ANY($1)")
        .bind(codes)
        .fetch_all(pool)
        .await
        .map_err(query_error("Failed to query gold-card codes"))?;

    Ok(found.into_iter().collect())
}

/// Inserts `codes` in one statement, skipping ones already present.
pub async fn insert_codes(pool: &PgPool, codes: &[String]) -> Result<u64, StorageError> {
    if codes.is_empty() {
        return Ok(0);
    }

    let result = query(
        r#"INSERT INTO gold_card_codes (code, created_at, updated_at)
           SELECT DISTINCT c, now(), now() FROM UNNEST($1::text[]) AS c
           ON CONFLICT (code) DO NOTHING"#,
    )
    .bind(codes)
    .execute(pool)
    .await
    .map_err(query_error("Failed to insert gold-card codes"))?;

    Ok(result.rows_affected())
}
