//! The CertificateService: lifecycle operations over a certificate store.
//!
//! Every state change is computed in memory from the certificate as read,
//! then written back with an optimistic precondition together with its audit
//! entry. A writer that loses the race gets
//! [`ServiceError::ConcurrentModification`]; nothing is retried.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use cert_registry_core::{
    parse_certificate_id, validate_bulk_request, validate_reason, ActorId, AuditEntry,
    Certificate, CertificateId, EventId, NewCertificate, Owner,
};
use cert_registry_store::{CertificateStore, Expected, InsertResult, UpdateResult};

use crate::api::{
    BulkItemResult, BulkReissueReport, BulkReissueRequest, IssueRequest, ReissueRequest,
    RevokeRequest,
};
use crate::config::ServiceConfig;
use crate::directory::ActorDirectory;
use crate::error::{Result, ServiceError};

/// Certificate lifecycle service.
///
/// Provides:
/// - Issuing certificates to exactly one owner
/// - Revoking (terminal)
/// - Reissuing, singly or in bulk, with version history
/// - Read access to certificates and their audit trail
pub struct CertificateService<S: CertificateStore, D: ActorDirectory> {
    store: Arc<S>,
    directory: Arc<D>,
    config: ServiceConfig,
}

impl<S: CertificateStore, D: ActorDirectory> CertificateService<S, D> {
    pub fn new(store: S, directory: D, config: ServiceConfig) -> Self {
        Self {
            store: Arc::new(store),
            directory: Arc::new(directory),
            config,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Issue
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue a new certificate at version 1 with an empty history.
    ///
    /// Each call creates a new certificate; deduplication is up to the caller.
    pub async fn issue(&self, new: NewCertificate, actor: ActorId) -> Result<Certificate> {
        let label = self.attribute(actor).await?;
        let now = Utc::now();

        let cert = Certificate::issue(new, actor, now);
        let audit = labelled(AuditEntry::issue(&cert, actor, now), label);

        match self.store.insert_certificate(&cert, &audit).await? {
            InsertResult::Inserted => {
                info!(
                    certificate_id = %cert.id,
                    owner_type = %cert.owner.owner_type(),
                    actor_id = %actor,
                    "certificate issued"
                );
                Ok(cert)
            }
            InsertResult::AlreadyExists => Err(ServiceError::AlreadyExists(cert.id)),
        }
    }

    /// Issue from the flat request shape (discriminator plus reference columns).
    pub async fn issue_from_request(
        &self,
        request: IssueRequest,
        actor: ActorId,
    ) -> Result<Certificate> {
        let new = request.into_new_certificate()?;
        self.issue(new, actor).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Revoke
    // ─────────────────────────────────────────────────────────────────────────

    /// Revoke a certificate. A second revoke fails with `AlreadyRevoked`.
    pub async fn revoke(
        &self,
        id: CertificateId,
        reason: &str,
        actor: ActorId,
    ) -> Result<Certificate> {
        let reason = validate_reason(reason, self.config.max_reason_len)?;
        let label = self.attribute(actor).await?;

        let current = self.get(&id).await?;
        let now = Utc::now();
        let next = current.revoked(reason, actor, now)?;
        let audit = labelled(
            AuditEntry::revoke(&current, &next, actor, reason, now),
            label,
        );

        let revoked = self.commit(&current, next, &audit).await?;
        info!(certificate_id = %id, actor_id = %actor, "certificate revoked");
        Ok(revoked)
    }

    /// Revoke addressed by a caller-supplied id string.
    pub async fn revoke_certificate(
        &self,
        raw_id: &str,
        request: &RevokeRequest,
        actor: ActorId,
    ) -> Result<Certificate> {
        let id = parse_certificate_id(raw_id)?;
        self.revoke(id, &request.reason, actor).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reissue
    // ─────────────────────────────────────────────────────────────────────────

    /// Reissue a certificate: snapshot the prior state into the history and
    /// bump the version by one. Revoked certificates are rejected.
    pub async fn reissue(
        &self,
        id: CertificateId,
        reason: &str,
        actor: ActorId,
    ) -> Result<Certificate> {
        let reason = validate_reason(reason, self.config.max_reason_len)?;
        let label = self.attribute(actor).await?;
        self.reissue_attributed(id, reason, actor, label).await
    }

    /// Reissue addressed by a caller-supplied id string.
    pub async fn reissue_certificate(
        &self,
        raw_id: &str,
        request: &ReissueRequest,
        actor: ActorId,
    ) -> Result<Certificate> {
        let id = parse_certificate_id(raw_id)?;
        self.reissue(id, &request.reason, actor).await
    }

    /// Reissue many certificates, each independently.
    ///
    /// Input shape errors and an unknown actor abort the call before any
    /// certificate is touched. After that, per-item failures are recorded in
    /// the report and never stop the remaining items.
    pub async fn bulk_reissue_certificates(
        &self,
        request: &BulkReissueRequest,
        actor: ActorId,
    ) -> Result<BulkReissueReport> {
        let (ids, reason) =
            validate_bulk_request(&request.certificate_ids, &request.reason, self.config.limits())?;
        let label = self.attribute(actor).await?;

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            match self.reissue_attributed(id, reason, actor, label.clone()).await {
                Ok(cert) => results.push(BulkItemResult::succeeded(id, cert.version)),
                Err(e) => {
                    warn!(certificate_id = %id, error = %e, "bulk reissue item failed");
                    results.push(BulkItemResult::failed(id, e.public_message()));
                }
            }
        }

        let report = BulkReissueReport::from_results(results);
        info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            actor_id = %actor,
            "bulk reissue finished"
        );
        Ok(report)
    }

    async fn reissue_attributed(
        &self,
        id: CertificateId,
        reason: &str,
        actor: ActorId,
        label: Option<String>,
    ) -> Result<Certificate> {
        let current = self.get(&id).await?;
        let now = Utc::now();
        let next = current.reissued(reason, actor, now)?;
        let audit = labelled(
            AuditEntry::reissue(&current, &next, actor, reason, now),
            label,
        );

        let reissued = self.commit(&current, next, &audit).await?;
        info!(
            certificate_id = %id,
            version = reissued.version,
            actor_id = %actor,
            "certificate reissued"
        );
        Ok(reissued)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get(&self, id: &CertificateId) -> Result<Certificate> {
        self.store
            .get_certificate(id)
            .await?
            .ok_or(ServiceError::NotFound(*id))
    }

    /// Look up a certificate by its public verification code.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Certificate>> {
        Ok(self.store.get_by_code(code.trim()).await?)
    }

    pub async fn list_for_owner(&self, owner: &Owner) -> Result<Vec<Certificate>> {
        Ok(self.store.list_by_owner(owner).await?)
    }

    pub async fn list_for_event(&self, event_id: &EventId) -> Result<Vec<Certificate>> {
        Ok(self.store.list_by_event(event_id).await?)
    }

    /// Audit entries for a certificate, oldest first.
    pub async fn audit_trail(&self, id: &CertificateId) -> Result<Vec<AuditEntry>> {
        Ok(self.store.audit_entries(id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve the actor's display label for the audit entry.
    async fn attribute(&self, actor: ActorId) -> Result<Option<String>> {
        match self.directory.resolve(&actor).await {
            Some(resolved) => Ok(Some(resolved.display_name)),
            None if self.config.require_known_actor => Err(ServiceError::UnknownActor(actor)),
            None => Ok(None),
        }
    }

    /// Write `next` and its audit entry if the stored certificate still
    /// matches `current`.
    async fn commit(
        &self,
        current: &Certificate,
        next: Certificate,
        audit: &AuditEntry,
    ) -> Result<Certificate> {
        match self
            .store
            .update_certificate(Expected::of(current), &next, audit)
            .await?
        {
            UpdateResult::Updated => Ok(next),
            UpdateResult::Missing => Err(ServiceError::NotFound(next.id)),
            UpdateResult::Stale => {
                warn!(
                    certificate_id = %next.id,
                    read_version = current.version,
                    "certificate changed since it was read"
                );
                Err(ServiceError::ConcurrentModification(next.id))
            }
        }
    }
}

fn labelled(entry: AuditEntry, label: Option<String>) -> AuditEntry {
    match label {
        Some(label) => entry.with_actor_label(label),
        None => entry,
    }
}
