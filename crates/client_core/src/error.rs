use storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("listing store query failed: {0}")]
    Store(#[from] StoreError),
    #[error("cursor was issued for a different query scope")]
    CursorScopeMismatch,
    #[error("invalid cursor token: {0}")]
    InvalidCursor(String),
    #[error("page size must be positive")]
    EmptyPageSize,
}

impl FetchError {
    /// Short user-facing description, distinct from "no results".
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Store(StoreError::PermissionDenied(_)) => "Listings are not available right now.",
            Self::Store(StoreError::MalformedQuery(_))
            | Self::CursorScopeMismatch
            | Self::InvalidCursor(_)
            | Self::EmptyPageSize => "Your search could not be completed. Try adjusting the filters.",
            Self::Store(_) => "Could not load listings. Check your connection and try again.",
        }
    }
}

/// Terminal map failure. The list view keeps working; the map shows an error panel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapInitError {
    #[error("map access token is missing")]
    MissingAccessToken,
    #[error("map container element is missing")]
    MissingContainer,
    #[error("map sdk failed to initialize: {0}")]
    Sdk(String),
}
