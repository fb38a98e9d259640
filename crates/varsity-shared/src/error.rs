use thiserror::Error;

/// Portal-wide error taxonomy.
///
/// Policy evaluation itself never produces one of these: the visibility
/// predicates are total functions. Errors arise only when resolving,
/// mutating, or streaming concrete items.
#[derive(Error, Debug)]
pub enum PortalError {
    /// Item, attachment, or underlying file absent, or a malformed id.
    /// Always safe to return without further detail.
    #[error("Not found")]
    NotFound,

    /// Visibility or download-policy rejection. Deliberately carries no
    /// existence-distinguishing detail.
    #[error("Not authorized")]
    Forbidden,

    /// Malformed request input that could not be corrected defensively.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Stored-file service or notifier failure.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

/// Convenience alias used throughout the portal crates.
pub type Result<T> = std::result::Result<T, PortalError>;
