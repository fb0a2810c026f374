//! Arbitration errors.
//!
//! Unresolvable conflicts are not errors; they come back as
//! [`Verdict::UnresolvableSafely`](super::Verdict::UnresolvableSafely).

#[derive(Debug, thiserror::Error)]
pub enum ArbitrationError {
    #[error("cannot arbitrate an empty component")]
    EmptyComponent,

    #[error("arbitration worker failed: {0}")]
    Worker(String),
}

pub type ArbitrationResult<T> = std::result::Result<T, ArbitrationError>;
