//! # cptlookup-auth
//!
//! Upstream credential handling for the CPT lookup proxy.
//!
//! ## Modules
//!
//! - [`client_credentials`] - OAuth2 client-credentials token manager
//! - [`error`] - Credential error types

pub mod client_credentials;
pub mod error;

pub use client_credentials::{ClientCredentialsConfig, CredentialManager, TokenResponse};
pub use error::CredentialError;
