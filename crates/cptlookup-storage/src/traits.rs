//! Storage traits for the decision cache and the gold-card list.
//!
//! Every backend implements both traits. Implementations must be thread-safe
//! (`Send + Sync`) since a single instance is shared across request handlers.

use std::collections::HashSet;

use async_trait::async_trait;
use cptlookup_core::DecisionResponse;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::types::UpsertOutcome;

/// Cache of prior-authorization decisions keyed by category and jurisdiction.
///
/// # Example
///
/// ```ignore
/// use cptlookup_storage::{DecisionStore, StorageError};
///
/// async fn cached(store: &dyn DecisionStore) -> Result<usize, StorageError> {
///     let response = store.get("CA", &["99213".to_string()]).await?;
///     Ok(response.preliminary_determinations.len())
/// }
/// ```
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Loads the cached decision for a jurisdiction with all children.
    ///
    /// When several categories are cached for the same jurisdiction the
    /// earliest inserted record wins. A non-empty `procedure_codes` filters
    /// the determinations; the filtered list keeps its stored order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no record exists for the
    /// jurisdiction, or if filtering leaves zero determinations.
    async fn get(
        &self,
        policy_issue_state: &str,
        procedure_codes: &[String],
    ) -> Result<DecisionResponse, StorageError>;

    /// Merges a fresh upstream response into the cache as of `now`.
    ///
    /// A missing record is inserted. An existing record older than the
    /// staleness window loses its determinations and takes the incoming
    /// top-level fields. In every case the incoming determinations are
    /// appended and `updated_at` is set to `now`, atomically.
    async fn upsert_at(
        &self,
        response: &DecisionResponse,
        now: OffsetDateTime,
    ) -> Result<UpsertOutcome, StorageError>;

    /// Same as [`upsert_at`](Self::upsert_at) with the current UTC time.
    async fn upsert(&self, response: &DecisionResponse) -> Result<UpsertOutcome, StorageError> {
        self.upsert_at(response, OffsetDateTime::now_utc()).await
    }

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Returns the name of this storage backend.
    fn backend_name(&self) -> &'static str;
}

/// Allow-list of gold-card procedure codes.
#[async_trait]
pub trait GoldCardStore: Send + Sync {
    /// Returns the subset of `codes` present in the list, in one query.
    async fn find_existing(&self, codes: &[String]) -> Result<HashSet<String>, StorageError>;

    /// Inserts codes, ignoring ones already present.
    ///
    /// Returns how many codes were newly added.
    async fn insert_codes(&self, codes: &[String]) -> Result<u64, StorageError>;
}
