//! PostgreSQL implementation of the storage traits.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;

use cptlookup_core::DecisionResponse;
use cptlookup_storage::{
    DecisionStore, GoldCardStore, StalenessWindow, StorageError, UpsertOutcome,
};

use crate::config::PostgresConfig;
use crate::queries::{decisions, gold_cards};
use crate::{migrations, pool};

/// PostgreSQL-backed decision cache and gold-card list.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    staleness: StalenessWindow,
}

impl PostgresStorage {
    /// Creates a new `PostgresStorage` with the given configuration.
    ///
    /// This will:
    /// 1. Create a connection pool
    /// 2. Run migrations if `config.run_migrations` is true
    ///
    /// # Errors
    ///
    /// Returns an error if the connection pool cannot be created
    /// or if migrations fail.
    pub async fn new(
        config: PostgresConfig,
        staleness: StalenessWindow,
    ) -> Result<Self, StorageError> {
        let pool = pool::create_pool(&config).await?;

        if config.run_migrations {
            migrations::run(&pool).await?;
        }

        Ok(Self { pool, staleness })
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DecisionStore for PostgresStorage {
    async fn get(
        &self,
        policy_issue_state: &str,
        procedure_codes: &[String],
    ) -> Result<DecisionResponse, StorageError> {
        decisions::get(&self.pool, policy_issue_state, procedure_codes).await
    }

    async fn upsert_at(
        &self,
        response: &DecisionResponse,
        now: OffsetDateTime,
    ) -> Result<UpsertOutcome, StorageError> {
        let outcome = decisions::upsert(&self.pool, self.staleness, response, now).await?;
        tracing::debug!(
            key = %response.key(),
            outcome = %outcome,
            determinations = response.preliminary_determinations.len(),
            "Decision cached"
        );
        Ok(outcome)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        pool::test_connection(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl GoldCardStore for PostgresStorage {
    async fn find_existing(&self, codes: &[String]) -> Result<HashSet<String>, StorageError> {
        gold_cards::find_existing(&self.pool, codes).await
    }

    async fn insert_codes(&self, codes: &[String]) -> Result<u64, StorageError> {
        gold_cards::insert_codes(&self.pool, codes).await
    }
}
