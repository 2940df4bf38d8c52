use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use cptlookup_core::{DecisionResponse, ProcedureDetermination};
use cptlookup_storage::{
    DecisionStore, GoldCardStore, StalenessWindow, StorageError, UpsertOutcome,
};

#[derive(Debug, Default)]
struct Tables {
    /// Kept in insertion order, which is also row-id order.
    decisions: Vec<DecisionResponse>,
    gold_cards: HashSet<String>,
}

/// In-memory decision cache and gold-card list.
///
/// Mirrors the PostgreSQL backend's semantics, including row ids and the
/// staleness merge, so it can stand in for it in tests and local runs.
#[derive(Debug)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
    /// Shared id sequence for every stored node.
    next_id: AtomicI64,
    staleness: StalenessWindow,
}

impl InMemoryStorage {
    /// Creates an empty storage with the default staleness window.
    pub fn new() -> Self {
        Self::with_staleness(StalenessWindow::default())
    }

    pub fn with_staleness(staleness: StalenessWindow) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            next_id: AtomicI64::new(1),
            staleness,
        }
    }

    /// Number of cached decision records.
    pub async fn decision_count(&self) -> usize {
        self.tables.read().await.decisions.len()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Copies a determination tree for storage with fresh ids and no
    /// transient fields.
    fn stored_determination(&self, incoming: &ProcedureDetermination) -> ProcedureDetermination {
        let mut determination = incoming.clone();
        determination.id = Some(self.next_id());
        determination.is_gold_card = false;
        for site in &mut determination.sites_of_service {
            site.id = Some(self.next_id());
            for condition in &mut site.conditions {
                condition.id = Some(self.next_id());
            }
        }
        determination
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionStore for InMemoryStorage {
    async fn get(
        &self,
        policy_issue_state: &str,
        procedure_codes: &[String],
    ) -> Result<DecisionResponse, StorageError> {
        let tables = self.tables.read().await;
        let mut response = tables
            .decisions
            .iter()
            .find(|d| d.policy_issue_state == policy_issue_state)
            .cloned()
            .ok_or_else(|| StorageError::no_record(policy_issue_state))?;
        drop(tables);

        response.retain_procedures(procedure_codes);
        if !procedure_codes.is_empty() && response.preliminary_determinations.is_empty() {
            return Err(StorageError::no_matching_procedures(
                policy_issue_state,
                procedure_codes,
            ));
        }
        Ok(response)
    }

    async fn upsert_at(
        &self,
        response: &DecisionResponse,
        now: OffsetDateTime,
    ) -> Result<UpsertOutcome, StorageError> {
        let appended: Vec<_> = response
            .preliminary_determinations
            .iter()
            .map(|d| self.stored_determination(d))
            .collect();

        let mut tables = self.tables.write().await;
        let existing = tables.decisions.iter_mut().find(|d| {
            d.product_category == response.product_category
                && d.policy_issue_state == response.policy_issue_state
        });

        let Some(existing) = existing else {
            let mut stored = DecisionResponse::new(
                response.product_category.clone(),
                response.policy_issue_state.clone(),
            );
            stored.id = Some(self.next_id());
            stored.diagnosis_code = response.diagnosis_code.clone();
            stored.preliminary_determinations = appended;
            stored.created_at = Some(now);
            stored.updated_at = Some(now);
            tables.decisions.push(stored);
            return Ok(UpsertOutcome::Inserted);
        };

        let outcome = if self.staleness.is_stale(existing.updated_at, now) {
            existing.preliminary_determinations.clear();
            existing.product_category = response.product_category.clone();
            existing.diagnosis_code = response.diagnosis_code.clone();
            UpsertOutcome::Reset
        } else {
            UpsertOutcome::Appended
        };

        existing.preliminary_determinations.extend(appended);
        existing.updated_at = Some(now);
        Ok(outcome)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl GoldCardStore for InMemoryStorage {
    async fn find_existing(&self, codes: &[String]) -> Result<HashSet<String>, StorageError> {
        let tables = self.tables.read().await;
        Ok(codes
            .iter()
            .filter(|code| tables.gold_cards.contains(*code))
            .cloned()
            .collect())
    }

    async fn insert_codes(&self, codes: &[String]) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        let added = codes
            .iter()
            .filter(|code| tables.gold_cards.insert((*code).clone()))
            .count();
        Ok(added as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cptlookup_core::{Condition, SiteOfService};
    use time::Duration;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-05-01 08:00 UTC);

    fn response(category: &str, state: &str, codes: &[&str]) -> DecisionResponse {
        codes
            .iter()
            .fold(DecisionResponse::new(category, state), |acc, code| {
                acc.with_determination(
                    ProcedureDetermination::new(*code, "desc", "summary").with_site(
                        SiteOfService::new("Office", "NR")
                            .with_condition(Condition::new("Age", "18+")),
                    ),
                )
            })
    }

    fn codes(response: &DecisionResponse) -> Vec<&str> {
        response.procedure_codes().collect()
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let storage = InMemoryStorage::new();
        let outcome = storage
            .upsert_at(&response("MED", "CA", &["A", "B"]), T0)
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let cached = storage.get("CA", &[]).await.unwrap();
        assert_eq!(codes(&cached), vec!["A", "B"]);
        assert_eq!(cached.created_at, Some(T0));
        assert!(cached.id.is_some());
        let site = &cached.preliminary_determinations[0].sites_of_service[0];
        assert!(site.id.is_some());
        assert_eq!(site.conditions[0].condition_detail, "18+");
    }

    #[tokio::test]
    async fn test_text_fields_survive_upsert_and_reset() {
        let storage = InMemoryStorage::new();
        let first = DecisionResponse::new("MED", "CA").with_determination(
            ProcedureDetermination::new("99213", "Office visit, established", "No PA required"),
        );
        storage.upsert_at(&first, T0).await.unwrap();

        let cached = storage.get("CA", &["99213".to_string()]).await.unwrap();
        let determination = &cached.preliminary_determinations[0];
        assert_eq!(determination.procedure_description, "Office visit, established");
        assert_eq!(determination.decision_summary_text, "No PA required");

        let second = DecisionResponse::new("MED", "CA").with_determination(
            ProcedureDetermination::new("99213", "Office visit, revised", "PA required"),
        );
        let outcome = storage
            .upsert_at(&second, T0 + Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Reset);

        let cached = storage.get("CA", &[]).await.unwrap();
        assert_eq!(cached.preliminary_determinations.len(), 1);
        let determination = &cached.preliminary_determinations[0];
        assert_eq!(determination.procedure_description, "Office visit, revised");
        assert_eq!(determination.decision_summary_text, "PA required");
    }

    #[tokio::test]
    async fn test_filtered_get() {
        let storage = InMemoryStorage::new();
        storage
            .upsert_at(&response("MED", "CA", &["A", "B", "C"]), T0)
            .await
            .unwrap();

        let cached = storage
            .get("CA", &["C".to_string(), "A".to_string()])
            .await
            .unwrap();
        assert_eq!(codes(&cached), vec!["A", "C"]);

        let err = storage.get("CA", &["Z".to_string()]).await.unwrap_err();
        assert!(err.is_not_found());
        let err = storage.get("TX", &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fresh_upsert_appends_duplicates() {
        let storage = InMemoryStorage::new();
        storage
            .upsert_at(&response("MED", "CA", &["A"]), T0)
            .await
            .unwrap();

        let later = T0 + Duration::hours(23);
        let outcome = storage
            .upsert_at(&response("MED", "CA", &["A", "B"]), later)
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Appended);

        let cached = storage.get("CA", &[]).await.unwrap();
        assert_eq!(codes(&cached), vec!["A", "A", "B"]);
        assert_eq!(cached.updated_at, Some(later));
        assert_eq!(storage.decision_count().await, 1);
    }

    #[tokio::test]
    async fn test_stale_upsert_resets() {
        let storage = InMemoryStorage::with_staleness(StalenessWindow::from_hours(24));
        storage
            .upsert_at(&response("MED", "CA", &["A", "B"]), T0)
            .await
            .unwrap();

        let later = T0 + Duration::hours(24) + Duration::seconds(1);
        let incoming = response("MED", "CA", &["C"]).with_diagnosis_code("M17.11");
        let outcome = storage.upsert_at(&incoming, later).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Reset);

        let cached = storage.get("CA", &[]).await.unwrap();
        assert_eq!(codes(&cached), vec!["C"]);
        assert_eq!(cached.diagnosis_code.as_deref(), Some("M17.11"));
        assert_eq!(cached.created_at, Some(T0));
    }

    #[tokio::test]
    async fn test_each_upsert_restarts_the_window() {
        let storage = InMemoryStorage::with_staleness(StalenessWindow::from_hours(24));
        storage
            .upsert_at(&response("MED", "CA", &["A"]), T0)
            .await
            .unwrap();
        storage
            .upsert_at(&response("MED", "CA", &["B"]), T0 + Duration::hours(20))
            .await
            .unwrap();

        let outcome = storage
            .upsert_at(&response("MED", "CA", &["C"]), T0 + Duration::hours(30))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Appended);
    }

    #[tokio::test]
    async fn test_transient_fields_are_not_stored() {
        let storage = InMemoryStorage::new();
        let mut incoming = response("MED", "CA", &["A"]);
        incoming.apply_disclaimer();
        incoming.preliminary_determinations[0].is_gold_card = true;

        storage.upsert_at(&incoming, T0).await.unwrap();

        let cached = storage.get("CA", &[]).await.unwrap();
        assert!(cached.disclaimer_text.is_empty());
        assert!(!cached.preliminary_determinations[0].is_gold_card);
    }

    #[tokio::test]
    async fn test_first_category_wins() {
        let storage = InMemoryStorage::new();
        storage
            .upsert_at(&response("MED", "FL", &["A"]), T0)
            .await
            .unwrap();
        storage
            .upsert_at(&response("DME", "FL", &["B"]), T0)
            .await
            .unwrap();

        assert_eq!(storage.get("FL", &[]).await.unwrap().product_category, "MED");
        assert_eq!(storage.decision_count().await, 2);
    }

    #[tokio::test]
    async fn test_gold_cards() {
        let storage = InMemoryStorage::new();
        let added = storage
            .insert_codes(&["A".to_string(), "B".to_string(), "A".to_string()])
            .await
            .unwrap();
        assert_eq!(added, 2);

        let found = storage
            .find_existing(&["B".to_string(), "Z".to_string()])
            .await
            .unwrap();
        assert_eq!(found, HashSet::from(["B".to_string()]));
    }
}
