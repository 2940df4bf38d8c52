//! Gold-card procedure codes.
//!
//! A gold-card code marks a procedure as exempt from prior-authorization
//! review. The list is maintained independently of cached decisions and is
//! only consulted by code.

use std::collections::HashSet;

use crate::decision::DecisionResponse;

/// One entry of the gold-card allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldCardCode {
    pub code: String,
}

impl GoldCardCode {
    /// Builds an entry from a raw code, trimming whitespace.
    ///
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim();
        if code.is_empty() {
            return None;
        }
        Some(Self {
            code: code.to_string(),
        })
    }
}

/// Distinct procedure codes of a response, in first-seen order.
pub fn distinct_codes(response: &DecisionResponse) -> Vec<String> {
    let mut seen = HashSet::new();
    response
        .procedure_codes()
        .filter(|code| seen.insert(*code))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ProcedureDetermination;

    #[test]
    fn test_parse_trims_and_skips_blank() {
        assert_eq!(GoldCardCode::parse("  99213 \r").unwrap().code, "99213");
        assert!(GoldCardCode::parse("   ").is_none());
        assert!(GoldCardCode::parse("").is_none());
    }

    #[test]
    fn test_distinct_codes_preserves_order() {
        let response = DecisionResponse::new("MED", "CA")
            .with_determination(ProcedureDetermination::new("99214", "", ""))
            .with_determination(ProcedureDetermination::new("99213", "", ""))
            .with_determination(ProcedureDetermination::new("99214", "", ""));

        assert_eq!(distinct_codes(&response), vec!["99214", "99213"]);
    }
}
