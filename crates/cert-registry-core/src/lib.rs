//! # Certificate Registry Core
//!
//! Pure primitives for the certificate registry: owners, certificates,
//! version history and audit entries.
//!
//! This crate contains no I/O and no storage. Every lifecycle transition is a
//! function from one certificate value to the next, so the store and service
//! layers only decide *where* a transition is persisted, never *what* it does.
//!
//! ## Key Types
//!
//! - [`Owner`] - Closed tagged union naming the single entity a certificate belongs to
//! - [`OwnerColumns`] - The flat five-column representation used by storage and DTOs
//! - [`Certificate`] - The record: owner, version, version history, revocation
//! - [`AuditEntry`] - One append-only record per state-changing action
//!
//! ## Lifecycle
//!
//! ```text
//! issue ──► version 1 ──reissue──► version 2 ──reissue──► ...
//!               │                      │
//!               └──────revoke──────────┴──► revoked (terminal)
//! ```

pub mod audit;
pub mod backfill;
pub mod certificate;
pub mod error;
pub mod owner;
pub mod types;
pub mod validation;

pub use audit::{AuditAction, AuditEntry, CERTIFICATE_ENTITY};
pub use backfill::{resolve_legacy_owner, BackfillOutcome, BACKFILL_PRIORITY};
pub use certificate::{
    Certificate, LastReissue, NewCertificate, Revocation, VersionHistoryEntry,
};
pub use error::{CoreError, LifecycleError, ValidationError};
pub use owner::{owner_check_sql, Owner, OwnerColumns, OwnerType};
pub use types::{ActorId, AuditEntryId, CertificateId, EventId};
pub use validation::{
    parse_certificate_id, validate_bulk_request, validate_reason, BulkLimits,
};
