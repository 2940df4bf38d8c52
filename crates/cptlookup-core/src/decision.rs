//! Prior-authorization decision types.
//!
//! One [`DecisionResponse`] exists per (product category, policy issue state)
//! pair. It owns an ordered list of [`ProcedureDetermination`]s, each of which
//! owns its [`SiteOfService`] entries and their [`Condition`]s. The same shape
//! is used for the upstream body, the cached record and the proxy response.
//!
//! Row ids and timestamps are storage metadata and never appear on the wire.
//! The gold-card flag and the disclaimer text are derived per response and
//! never persisted.

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// Disclaimer attached to every answer served from the local cache.
pub const DEFAULT_DISCLAIMER_TEXT: &str = "The search executed is based on data that you have selected. Your search is not a request for prior authorization and is not notification to UnitedHealthcare. Prior authorization is required for services that require it.";

/// Natural key of a cached decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub product_category: String,
    pub policy_issue_state: String,
}

impl std::fmt::Display for DecisionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.product_category, self.policy_issue_state)
    }
}

/// Top-level prior-authorization answer for one category and jurisdiction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    /// Storage row id, assigned by the store.
    #[serde(skip)]
    pub id: Option<i64>,

    pub product_category: String,

    pub policy_issue_state: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis_code: Option<String>,

    /// Populated only when the answer is served from the local cache.
    #[serde(default, deserialize_with = "nullable")]
    pub disclaimer_text: String,

    #[serde(default, deserialize_with = "nullable")]
    pub preliminary_determinations: Vec<ProcedureDetermination>,

    #[serde(skip)]
    pub created_at: Option<OffsetDateTime>,

    #[serde(skip)]
    pub updated_at: Option<OffsetDateTime>,
}

impl DecisionResponse {
    pub fn new(product_category: impl Into<String>, policy_issue_state: impl Into<String>) -> Self {
        Self {
            id: None,
            product_category: product_category.into(),
            policy_issue_state: policy_issue_state.into(),
            diagnosis_code: None,
            disclaimer_text: String::new(),
            preliminary_determinations: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with_determination(mut self, determination: ProcedureDetermination) -> Self {
        self.preliminary_determinations.push(determination);
        self
    }

    #[must_use]
    pub fn with_diagnosis_code(mut self, code: impl Into<String>) -> Self {
        self.diagnosis_code = Some(code.into());
        self
    }

    pub fn key(&self) -> DecisionKey {
        DecisionKey {
            product_category: self.product_category.clone(),
            policy_issue_state: self.policy_issue_state.clone(),
        }
    }

    /// Marks this response as served from the local cache.
    pub fn apply_disclaimer(&mut self) {
        self.disclaimer_text = DEFAULT_DISCLAIMER_TEXT.to_string();
    }

    /// Keeps only determinations whose procedure code is in `codes`.
    ///
    /// An empty `codes` slice keeps everything.
    pub fn retain_procedures(&mut self, codes: &[String]) {
        if codes.is_empty() {
            return;
        }
        self.preliminary_determinations
            .retain(|d| codes.iter().any(|c| c == &d.procedure_code));
    }

    /// Procedure codes in determination order, duplicates included.
    pub fn procedure_codes(&self) -> impl Iterator<Item = &str> {
        self.preliminary_determinations
            .iter()
            .map(|d| d.procedure_code.as_str())
    }
}

/// Decision outcome for one procedure code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureDetermination {
    #[serde(skip)]
    pub id: Option<i64>,

    #[serde(default, deserialize_with = "nullable")]
    pub procedure_code: String,

    #[serde(rename = "procedureCodeDesc", default, deserialize_with = "nullable")]
    pub procedure_description: String,

    #[serde(default, deserialize_with = "nullable")]
    pub decision_summary_text: String,

    /// Derived at annotate time, never stored.
    #[serde(rename = "gold_card_code", default, deserialize_with = "nullable")]
    pub is_gold_card: bool,

    #[serde(rename = "siteOfServices", default, deserialize_with = "nullable")]
    pub sites_of_service: Vec<SiteOfService>,
}

impl ProcedureDetermination {
    pub fn new(
        procedure_code: impl Into<String>,
        procedure_description: impl Into<String>,
        decision_summary_text: impl Into<String>,
    ) -> Self {
        Self {
            procedure_code: procedure_code.into(),
            procedure_description: procedure_description.into(),
            decision_summary_text: decision_summary_text.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_site(mut self, site: SiteOfService) -> Self {
        self.sites_of_service.push(site);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteOfService {
    #[serde(skip)]
    pub id: Option<i64>,

    #[serde(default, deserialize_with = "nullable")]
    pub site_of_service_type: String,

    #[serde(default, deserialize_with = "nullable")]
    pub decision_code: String,

    #[serde(default, deserialize_with = "nullable")]
    pub conditions: Vec<Condition>,
}

impl SiteOfService {
    pub fn new(site_of_service_type: impl Into<String>, decision_code: impl Into<String>) -> Self {
        Self {
            site_of_service_type: site_of_service_type.into(),
            decision_code: decision_code.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(skip)]
    pub id: Option<i64>,

    #[serde(default, deserialize_with = "nullable")]
    pub condition_name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub condition_detail: String,
}

impl Condition {
    pub fn new(condition_name: impl Into<String>, condition_detail: impl Into<String>) -> Self {
        Self {
            id: None,
            condition_name: condition_name.into(),
            condition_detail: condition_detail.into(),
        }
    }
}

/// Treats an explicit JSON `null` like a missing field.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    fn sample() -> DecisionResponse {
        DecisionResponse::new("MED", "CA").with_determination(
            ProcedureDetermination::new("99213", "Office visit", "No PA required").with_site(
                SiteOfService::new("Office", "NR")
                    .with_condition(Condition::new("Age", "Adults only")),
            ),
        )
    }

    #[test]
    fn test_serializes_wire_names() {
        let mut response = sample();
        response.id = Some(7);
        response.preliminary_determinations[0].is_gold_card = true;

        assert_json_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "productCategory": "MED",
                "policyIssueState": "CA",
                "disclaimerText": "",
                "preliminaryDeterminations": [{
                    "procedureCode": "99213",
                    "procedureCodeDesc": "Office visit",
                    "decisionSummaryText": "No PA required",
                    "gold_card_code": true,
                    "siteOfServices": [{
                        "siteOfServiceType": "Office",
                        "decisionCode": "NR",
                        "conditions": [{
                            "conditionName": "Age",
                            "conditionDetail": "Adults only"
                        }]
                    }]
                }]
            })
        );
    }

    #[test]
    fn test_parses_upstream_body_leniently() {
        let body = json!({
            "productCategory": "MED",
            "policyIssueState": "TX",
            "diagnosisCode": null,
            "preliminaryDeterminations": [{
                "procedureCode": "27447",
                "procedureCodeDesc": null,
                "siteOfServices": null,
                "unknownField": 42
            }],
            "somethingElse": true
        });

        let parsed: DecisionResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.policy_issue_state, "TX");
        assert_eq!(parsed.diagnosis_code, None);
        assert_eq!(parsed.preliminary_determinations.len(), 1);
        let pd = &parsed.preliminary_determinations[0];
        assert_eq!(pd.procedure_code, "27447");
        assert_eq!(pd.procedure_description, "");
        assert!(pd.sites_of_service.is_empty());
        assert!(!pd.is_gold_card);
    }

    #[test]
    fn test_missing_key_fields_fail_to_parse() {
        let result = serde_json::from_str::<DecisionResponse>(r#"{"preliminaryDeterminations":[]}"#);
        assert!(result.is_err());

        let result = serde_json::from_str::<DecisionResponse>("<html>gateway</html>");
        assert!(result.is_err());
    }

    #[test]
    fn test_diagnosis_code_omitted_when_absent() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value.get("diagnosisCode").is_none());

        let value = serde_json::to_value(sample().with_diagnosis_code("M17.11")).unwrap();
        assert_eq!(value["diagnosisCode"], "M17.11");
    }

    #[test]
    fn test_retain_procedures() {
        let mut response = DecisionResponse::new("MED", "CA")
            .with_determination(ProcedureDetermination::new("A", "", ""))
            .with_determination(ProcedureDetermination::new("B", "", ""))
            .with_determination(ProcedureDetermination::new("C", "", ""));

        response.retain_procedures(&[]);
        assert_eq!(response.preliminary_determinations.len(), 3);

        response.retain_procedures(&["B".to_string(), "Z".to_string()]);
        let codes: Vec<_> = response.procedure_codes().collect();
        assert_eq!(codes, vec!["B"]);
    }

    #[test]
    fn test_apply_disclaimer_and_key() {
        let mut response = sample();
        response.apply_disclaimer();
        assert_eq!(response.disclaimer_text, DEFAULT_DISCLAIMER_TEXT);
        assert_eq!(response.key().to_string(), "MED/CA");
    }
}
