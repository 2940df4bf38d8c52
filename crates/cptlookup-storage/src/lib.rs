//! # cptlookup-storage
//!
//! Storage abstraction layer for the CPT lookup proxy.
//!
//! This crate defines the traits and types that all storage backends must implement.
//! It does not contain any implementations - those are provided by separate crates.
//!
//! ## Overview
//!
//! - [`DecisionStore`] caches upstream decisions and applies the staleness merge.
//! - [`GoldCardStore`] answers batch membership queries against the gold-card list.

mod error;
mod traits;
mod types;

pub use error::StorageError;
pub use traits::{DecisionStore, GoldCardStore};
pub use types::{StalenessWindow, UpsertOutcome};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared handle to a decision cache backend.
pub type DynDecisionStore = std::sync::Arc<dyn DecisionStore>;

/// Shared handle to a gold-card backend.
pub type DynGoldCardStore = std::sync::Arc<dyn GoldCardStore>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::StorageError;
    pub use crate::traits::{DecisionStore, GoldCardStore};
    pub use crate::types::{StalenessWindow, UpsertOutcome};
    pub use crate::{DynDecisionStore, DynGoldCardStore, StorageResult};
}
