//! Storage error types for the decision cache abstraction layer.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No cached decision matches the requested jurisdiction and codes.
    #[error("No cached decision for {policy_issue_state}: {detail}")]
    NotFound {
        /// The jurisdiction that was looked up.
        policy_issue_state: String,
        /// Why nothing matched.
        detail: String,
    },

    /// An error occurred during a transaction.
    #[error("Transaction error: {message}")]
    TransactionError {
        /// Description of the transaction error.
        message: String,
    },

    /// Failed to connect to the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a `NotFound` error for a jurisdiction with no record at all.
    #[must_use]
    pub fn no_record(policy_issue_state: impl Into<String>) -> Self {
        Self::NotFound {
            policy_issue_state: policy_issue_state.into(),
            detail: "no record for jurisdiction".into(),
        }
    }

    /// Creates a `NotFound` error for a record whose determinations do not
    /// cover any of the requested codes.
    #[must_use]
    pub fn no_matching_procedures(policy_issue_state: impl Into<String>, codes: &[String]) -> Self {
        Self::NotFound {
            policy_issue_state: policy_issue_state.into(),
            detail: format!("no determinations for procedure codes {codes:?}"),
        }
    }

    /// Creates a new `TransactionError` error.
    #[must_use]
    pub fn transaction_error(message: impl Into<String>) -> Self {
        Self::TransactionError {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::no_record("CA");
        assert_eq!(
            err.to_string(),
            "No cached decision for CA: no record for jurisdiction"
        );

        let err = StorageError::no_matching_procedures("CA", &["99213".to_string()]);
        assert_eq!(
            err.to_string(),
            r#"No cached decision for CA: no determinations for procedure codes ["99213"]"#
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(StorageError::no_record("TX").is_not_found());
        assert!(StorageError::no_matching_procedures("TX", &[]).is_not_found());
        assert!(!StorageError::internal("boom").is_not_found());
        assert!(!StorageError::connection_error("refused").is_not_found());
    }
}
