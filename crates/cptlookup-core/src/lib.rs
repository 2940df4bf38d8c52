pub mod decision;
pub mod error;
pub mod gold_card;
pub mod request;

pub use decision::{
    Condition, DEFAULT_DISCLAIMER_TEXT, DecisionKey, DecisionResponse, ProcedureDetermination,
    SiteOfService,
};
pub use error::{CoreError, Result};
pub use gold_card::{GoldCardCode, distinct_codes};
pub use request::{LookupRequest, UpstreamLookupBody};
