//! Inbound lookup requests and the outbound body built from them.

use serde::{Deserialize, Serialize};

use crate::decision::nullable;
use crate::error::{CoreError, Result};

/// Body of `POST /api`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    #[serde(rename = "policyIssueState")]
    pub policy_issue_state: String,

    /// Procedure codes to look up. Empty or `null` means every cached code.
    #[serde(rename = "procedureCode", default, deserialize_with = "nullable")]
    pub procedure_codes: Vec<String>,
}

impl LookupRequest {
    pub fn new(policy_issue_state: impl Into<String>, procedure_codes: Vec<String>) -> Self {
        Self {
            policy_issue_state: policy_issue_state.into(),
            procedure_codes,
        }
    }

    /// Parses and validates a raw request body.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidRequest` when the body is not a JSON object
    /// of the expected shape or fails validation.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let request: Self = serde_json::from_slice(body)
            .map_err(|e| CoreError::invalid_request(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.policy_issue_state.trim().is_empty() {
            return Err(CoreError::invalid_request(
                "policyIssueState must not be empty",
            ));
        }
        if let Some(pos) = self.procedure_codes.iter().position(|c| c.trim().is_empty()) {
            return Err(CoreError::invalid_request(format!(
                "procedureCode[{pos}] must not be empty"
            )));
        }
        Ok(())
    }
}

/// JSON body sent to the decision-lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamLookupBody<'a> {
    pub product_category: &'a str,
    pub policy_issue_state: &'a str,
    pub procedure_code: &'a [String],
    pub tin: &'a str,
}
