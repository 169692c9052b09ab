//! Error types for the certificate registry core.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::CertificateId;

/// Core errors raised while building or decoding domain values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid owner configuration: {0}")]
    InvalidOwnerConfiguration(String),

    #[error("unknown owner type: {0}")]
    UnknownOwnerType(String),

    #[error("legacy certificate has no owner reference")]
    NoLegacyOwner,

    #[error("corrupt version history: {0}")]
    CorruptHistory(String),
}

/// Errors from lifecycle transitions (revoke, reissue).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("certificate {id} was already revoked at {revoked_at}")]
    AlreadyRevoked {
        id: CertificateId,
        revoked_at: DateTime<Utc>,
    },

    #[error("certificate {0} is revoked and cannot be reissued")]
    Revoked(CertificateId),

    #[error("certificate {0} has reached the maximum version")]
    VersionOverflow(CertificateId),
}

/// Validation errors for caller-supplied input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("certificate id list must not be empty")]
    EmptyIdList,

    #[error("too many certificate ids: {got} exceeds limit of {max}")]
    TooManyIds { max: usize, got: usize },

    #[error("malformed certificate id at index {index}: {value:?}")]
    MalformedId { index: usize, value: String },

    #[error("malformed certificate id: {0:?}")]
    MalformedCertificateId(String),

    #[error("reason is required")]
    MissingReason,

    #[error("reason exceeds maximum length of {max} characters")]
    ReasonTooLong { max: usize },
}

