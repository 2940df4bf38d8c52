//! In-memory storage backend for the CPT lookup proxy.
//!
//! This crate provides an in-memory implementation of the `DecisionStore`
//! and `GoldCardStore` traits from `cptlookup-storage`, guarded by a tokio
//! `RwLock`.
//!
//! # Example
//!
//! ```ignore
//! use cptlookup_db_memory::InMemoryStorage;
//! use cptlookup_storage::DecisionStore;
//!
//! let storage = InMemoryStorage::new();
//! storage.upsert(&response).await?;
//! let cached = storage.get("CA", &[]).await?;
//! ```

pub mod storage;

pub use cptlookup_storage::{DecisionStore, GoldCardStore, StorageError};
pub use storage::InMemoryStorage;
