//! Error types for the sharing engine.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Record kinds an error can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    PantryItem,
    SharedItem,
    FoodRequest,
    Offer,
    UserLocation,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::PantryItem => write!(f, "pantry item"),
            Entity::SharedItem => write!(f, "shared item"),
            Entity::FoodRequest => write!(f, "food request"),
            Entity::Offer => write!(f, "offer"),
            Entity::UserLocation => write!(f, "location"),
        }
    }
}

/// Coarse category of a [`ShareError`], used to decide how a failure is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Ownership check failed.
    Forbidden,
    /// Target record missing or raced away.
    NotFound,
    /// A guarded precondition no longer holds. Retrying cannot help.
    Precondition,
    /// Storage or network collaborator failed.
    DependencyFailure,
}

/// Errors returned by the sharing engine.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: Uuid },

    #[error("Pantry item {0} is already shared")]
    AlreadyShared(Uuid),

    #[error("Shared item {0} is not available")]
    NotAvailable(Uuid),

    #[error("Food request {0} is not active")]
    RequestNotActive(Uuid),

    #[error("Food request {0} has already been fulfilled")]
    RequestAlreadyFulfilled(Uuid),

    #[error("Cannot offer to fulfill your own request")]
    SelfOffer,

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Neighbor lookup failed: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("Corrupt {table} row: {detail}")]
    CorruptRow { table: &'static str, detail: String },

    #[error("Change feed bridge has stopped")]
    BridgeClosed,
}

pub type Result<T> = std::result::Result<T, ShareError>;

impl ShareError {
    pub fn not_found(entity: Entity, id: Uuid) -> Self {
        ShareError::NotFound { entity, id }
    }

    pub(crate) fn corrupt(table: &'static str, detail: impl Into<String>) -> Self {
        ShareError::CorruptRow {
            table,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ShareError::Forbidden(_) => ErrorKind::Forbidden,
            ShareError::NotFound { .. } => ErrorKind::NotFound,
            ShareError::AlreadyShared(_)
            | ShareError::NotAvailable(_)
            | ShareError::RequestNotActive(_)
            | ShareError::RequestAlreadyFulfilled(_)
            | ShareError::SelfOffer => ErrorKind::Precondition,
            ShareError::Storage(_)
            | ShareError::Migration(_)
            | ShareError::Remote(_)
            | ShareError::CorruptRow { .. }
            | ShareError::BridgeClosed => ErrorKind::DependencyFailure,
        }
    }

    /// Precondition violations and ownership failures never change on retry.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::DependencyFailure
    }

    /// One-line explanation for end users. Dependency details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ShareError::Forbidden(_) => "You can only change your own items and requests.".into(),
            ShareError::NotFound { entity, .. } => {
                format!("That {} no longer exists.", entity)
            }
            ShareError::AlreadyShared(_) => "This item is already shared.".into(),
            ShareError::NotAvailable(_) => "This item has already been requested.".into(),
            ShareError::RequestNotActive(_) => "This request is no longer open.".into(),
            ShareError::RequestAlreadyFulfilled(_) => {
                "Too late, this request has already been fulfilled.".into()
            }
            ShareError::SelfOffer => "You cannot offer to fulfill your own request.".into(),
            ShareError::Storage(_)
            | ShareError::Migration(_)
            | ShareError::Remote(_)
            | ShareError::CorruptRow { .. }
            | ShareError::BridgeClosed => {
                "Something went wrong talking to the server. Please try again.".into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_errors_are_not_retryable() {
        let id = Uuid::new_v4();
        for err in [
            ShareError::AlreadyShared(id),
            ShareError::NotAvailable(id),
            ShareError::RequestNotActive(id),
            ShareError::RequestAlreadyFulfilled(id),
            ShareError::SelfOffer,
        ] {
            assert_eq!(err.kind(), ErrorKind::Precondition);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_dependency_errors_hide_details_from_users() {
        let err = ShareError::Storage(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::DependencyFailure);
        assert!(err.is_retryable());
        assert!(!err.user_message().contains("pool"));
    }

    #[test]
    fn test_not_found_names_entity() {
        let err = ShareError::not_found(Entity::Offer, Uuid::nil());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.user_message(), "That offer no longer exists.");
        assert!(err.to_string().starts_with("offer not found"));
    }
}
