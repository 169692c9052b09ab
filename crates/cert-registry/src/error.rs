//! Error types for the certificate service.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, warn};

use cert_registry_core::{
    ActorId, CertificateId, CoreError, LifecycleError, ValidationError,
};
use cert_registry_store::StoreError;

/// Errors that can occur during certificate operations.
///
/// Storage failures are never surfaced verbatim: the detail is logged and
/// the caller sees [`ServiceError::Storage`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The certificate id does not resolve.
    #[error("certificate not found: {0}")]
    NotFound(CertificateId),

    /// Owner discriminator and reference do not pair up.
    #[error("invalid owner configuration: {0}")]
    InvalidOwnerConfiguration(String),

    /// Revocation is terminal.
    #[error("certificate {id} already revoked at {revoked_at}")]
    AlreadyRevoked {
        id: CertificateId,
        revoked_at: DateTime<Utc>,
    },

    /// Revoked certificates cannot be reissued.
    #[error("certificate {0} is revoked")]
    Revoked(CertificateId),

    /// Another writer changed the certificate between read and write.
    #[error("certificate {0} was modified concurrently")]
    ConcurrentModification(CertificateId),

    /// Malformed caller input.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The actor does not resolve in the directory.
    #[error("unknown actor: {0}")]
    UnknownActor(ActorId),

    #[error("certificate already exists: {0}")]
    AlreadyExists(CertificateId),

    #[error("certificate {0} has reached its maximum version")]
    VersionExhausted(CertificateId),

    /// Opaque storage failure.
    #[error("storage failure")]
    Storage,
}

impl ServiceError {
    /// HTTP status class for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::UnknownActor(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::AlreadyRevoked { .. }
            | ServiceError::Revoked(_)
            | ServiceError::ConcurrentModification(_)
            | ServiceError::AlreadyExists(_)
            | ServiceError::VersionExhausted(_) => 409,
            ServiceError::InvalidOwnerConfiguration(_) => 422,
            ServiceError::Storage => 500,
        }
    }

    /// Short message safe to show callers, used in bulk reports.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::NotFound(_) => "not found".into(),
            ServiceError::InvalidOwnerConfiguration(_) => "invalid owner configuration".into(),
            ServiceError::AlreadyRevoked { .. } => "already revoked".into(),
            ServiceError::Revoked(_) => "certificate is revoked".into(),
            ServiceError::ConcurrentModification(_) => "concurrent modification".into(),
            ServiceError::Validation(e) => e.to_string(),
            ServiceError::UnknownActor(_) => "unknown actor".into(),
            ServiceError::AlreadyExists(_) => "already exists".into(),
            ServiceError::VersionExhausted(_) => "version limit reached".into(),
            ServiceError::Storage => "internal error".into(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OwnerConstraint(detail) => {
                warn!(%detail, "owner constraint rejected write");
                ServiceError::InvalidOwnerConfiguration(
                    "owner reference does not match owner type".into(),
                )
            }
            other => {
                error!(error = %other, "storage failure");
                ServiceError::Storage
            }
        }
    }
}

impl From<LifecycleError> for ServiceError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::AlreadyRevoked { id, revoked_at } => {
                ServiceError::AlreadyRevoked { id, revoked_at }
            }
            LifecycleError::Revoked(id) => ServiceError::Revoked(id),
            LifecycleError::VersionOverflow(id) => ServiceError::VersionExhausted(id),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidOwnerConfiguration(detail) => {
                ServiceError::InvalidOwnerConfiguration(detail)
            }
            CoreError::UnknownOwnerType(_) => {
                ServiceError::InvalidOwnerConfiguration(err.to_string())
            }
            other => {
                error!(error = %other, "inconsistent certificate state");
                ServiceError::Storage
            }
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_detail_is_not_leaked() {
        let err: ServiceError = StoreError::InvalidData("table certificates: secret".into()).into();
        assert_eq!(err, ServiceError::Storage);
        assert!(!err.to_string().contains("secret"));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_owner_constraint_becomes_domain_error() {
        let err: ServiceError =
            StoreError::OwnerConstraint("CHECK constraint failed: certificates_owner_check".into())
                .into();
        assert!(matches!(err, ServiceError::InvalidOwnerConfiguration(_)));
        assert!(!err.to_string().contains("CHECK"));
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_public_messages() {
        let id = CertificateId::new();
        assert_eq!(ServiceError::NotFound(id).public_message(), "not found");
        assert_eq!(
            ServiceError::AlreadyRevoked {
                id,
                revoked_at: Utc::now()
            }
            .public_message(),
            "already revoked"
        );
        assert_eq!(ServiceError::ConcurrentModification(id).status_code(), 409);
    }
}
