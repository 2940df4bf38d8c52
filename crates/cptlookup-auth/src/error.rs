//! Errors raised while obtaining upstream credentials.

/// Errors that can occur during the client-credentials exchange.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The token endpoint could not be reached or the call timed out.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The token endpoint answered with a non-200 status.
    #[error("Token request failed with status {status}: {body}")]
    Rejected {
        /// HTTP status returned by the token endpoint.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The token response could not be parsed.
    #[error("Failed to parse token response: {0}")]
    ParseError(String),

    /// The manager could not be built from the supplied settings.
    #[error("Invalid credential configuration: {0}")]
    Config(String),
}
