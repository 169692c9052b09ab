//! Store trait: the abstract interface for certificate persistence.
//!
//! This trait allows the service to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use cert_registry_core::{
    AuditEntry, Certificate, CertificateId, EventId, Owner, OwnerType,
};

use crate::error::Result;

/// Result of inserting a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Certificate and its audit entry were written.
    Inserted,
    /// A certificate with this id or code already exists. Nothing was written.
    AlreadyExists,
}

/// What the caller last read, used as the optimistic update precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub version: u32,
    pub revoked: bool,
}

impl Expected {
    pub fn of(cert: &Certificate) -> Self {
        Self {
            version: cert.version,
            revoked: cert.is_revoked(),
        }
    }
}

/// Result of a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// Certificate and audit entry were written atomically.
    Updated,
    /// No certificate with this id exists.
    Missing,
    /// The stored state no longer matches [`Expected`]. Nothing was written.
    Stale,
}

/// A legacy row whose owner was resolved by priority during backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillFlag {
    pub certificate_id: CertificateId,
    pub chosen: OwnerType,
    /// Every populated legacy reference, in priority order.
    pub populated: Vec<OwnerType>,
    pub flagged_at: DateTime<Utc>,
}

/// The CertificateStore trait: async interface for certificate persistence.
///
/// # Design Notes
///
/// - **No deletes**: certificates are retained indefinitely for audit.
/// - **Audit coupling**: every write takes the audit entry describing it and
///   persists both in one transaction, or neither.
/// - **Optimistic concurrency**: updates carry the state the caller read and
///   are rejected as [`UpdateResult::Stale`] if another writer got there first.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a newly issued certificate together with its audit entry.
    async fn insert_certificate(
        &self,
        cert: &Certificate,
        audit: &AuditEntry,
    ) -> Result<InsertResult>;

    /// Replace a certificate if it still matches `expected`, appending `audit`
    /// in the same transaction.
    async fn update_certificate(
        &self,
        expected: Expected,
        cert: &Certificate,
        audit: &AuditEntry,
    ) -> Result<UpdateResult>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_certificate(&self, id: &CertificateId) -> Result<Option<Certificate>>;

    /// Look up a certificate by its public verification code.
    async fn get_by_code(&self, code: &str) -> Result<Option<Certificate>>;

    /// All certificates held by `owner`, oldest first.
    async fn list_by_owner(&self, owner: &Owner) -> Result<Vec<Certificate>>;

    /// All certificates issued for an event, oldest first.
    async fn list_by_event(&self, event_id: &EventId) -> Result<Vec<Certificate>>;

    /// Audit entries for one certificate, in the order they were written.
    async fn audit_entries(&self, entity_id: &CertificateId) -> Result<Vec<AuditEntry>>;

    /// Legacy rows flagged during the owner backfill.
    async fn backfill_flags(&self) -> Result<Vec<BackfillFlag>>;
}
