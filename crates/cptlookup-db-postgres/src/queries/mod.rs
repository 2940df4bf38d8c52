//! SQL query implementations.

pub mod decisions;
pub mod gold_cards;
