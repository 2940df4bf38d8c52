//! Gold-card flags on served decisions.

use cptlookup_core::{DecisionResponse, distinct_codes};
use cptlookup_storage::DynGoldCardStore;

#[derive(Clone)]
pub struct GoldCardAnnotator {
    store: DynGoldCardStore,
}

impl GoldCardAnnotator {
    pub fn new(store: DynGoldCardStore) -> Self {
        Self { store }
    }

    /// Sets each determination's gold-card flag with one batch lookup.
    ///
    /// A failed lookup leaves every flag cleared.
    pub async fn annotate(&self, response: &mut DecisionResponse) {
        for determination in &mut response.preliminary_determinations {
            determination.is_gold_card = false;
        }

        let codes = distinct_codes(response);
        if codes.is_empty() {
            return;
        }

        let gold = match self.store.find_existing(&codes).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, codes = codes.len(), "gold-card lookup failed");
                return;
            }
        };

        for determination in &mut response.preliminary_determinations {
            determination.is_gold_card = gold.contains(&determination.procedure_code);
        }
    }
}
