//! Validated, immutable record of agent proposals pending resolution.
//!
//! - `store`: the [`ProposalStore`] and lifecycle bookkeeping
//! - `validate`: required-field checks
//! - `error`: [`SchemaError`]

pub mod error;
pub mod store;
pub mod validate;

pub use error::SchemaError;
pub use store::ProposalStore;
pub use validate::validate_proposal;
