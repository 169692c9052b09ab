//! In-memory implementation of the CertificateStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use cert_registry_core::{
    AuditEntry, AuditEntryId, Certificate, CertificateId, EventId, Owner, CERTIFICATE_ENTITY,
};

use crate::error::{Result, StoreError};
use crate::traits::{BackfillFlag, CertificateStore, Expected, InsertResult, UpdateResult};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Certificates in insertion order.
    certificates: Vec<Certificate>,

    /// Position of each certificate in `certificates`.
    by_id: HashMap<CertificateId, usize>,

    /// Code index: certificate_code -> position.
    by_code: HashMap<String, usize>,

    /// Append-only audit log.
    audit: Vec<AuditEntry>,

    audit_ids: HashSet<AuditEntryId>,
}

impl MemoryStoreInner {
    fn push_audit(&mut self, entry: &AuditEntry) {
        self.audit_ids.insert(entry.id);
        self.audit.push(entry.clone());
    }

    fn check_audit_unique(&self, entry: &AuditEntry) -> Result<()> {
        if self.audit_ids.contains(&entry.id) {
            return Err(StoreError::Constraint(format!(
                "duplicate audit entry id {}",
                entry.id
            )));
        }
        Ok(())
    }

    fn sorted(&self, mut matches: Vec<&Certificate>) -> Vec<Certificate> {
        // Stable sort keeps insertion order for equal timestamps.
        matches.sort_by_key(|c| c.issued_at);
        matches.into_iter().cloned().collect()
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn insert_certificate(
        &self,
        cert: &Certificate,
        audit: &AuditEntry,
    ) -> Result<InsertResult> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        if inner.by_id.contains_key(&cert.id) || inner.by_code.contains_key(&cert.certificate_code)
        {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.check_audit_unique(audit)?;

        let position = inner.certificates.len();
        inner.certificates.push(cert.clone());
        inner.by_id.insert(cert.id, position);
        inner.by_code.insert(cert.certificate_code.clone(), position);
        inner.push_audit(audit);

        Ok(InsertResult::Inserted)
    }

    async fn update_certificate(
        &self,
        expected: Expected,
        cert: &Certificate,
        audit: &AuditEntry,
    ) -> Result<UpdateResult> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        let Some(&position) = inner.by_id.get(&cert.id) else {
            return Ok(UpdateResult::Missing);
        };
        if Expected::of(&inner.certificates[position]) != expected {
            return Ok(UpdateResult::Stale);
        }
        inner.check_audit_unique(audit)?;

        inner.certificates[position] = cert.clone();
        inner.push_audit(audit);

        Ok(UpdateResult::Updated)
    }

    async fn get_certificate(&self, id: &CertificateId) -> Result<Option<Certificate>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .by_id
            .get(id)
            .map(|&position| inner.certificates[position].clone()))
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Certificate>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .by_code
            .get(code)
            .map(|&position| inner.certificates[position].clone()))
    }

    async fn list_by_owner(&self, owner: &Owner) -> Result<Vec<Certificate>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let matches = inner
            .certificates
            .iter()
            .filter(|c| c.owner == *owner)
            .collect();
        Ok(inner.sorted(matches))
    }

    async fn list_by_event(&self, event_id: &EventId) -> Result<Vec<Certificate>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let matches = inner
            .certificates
            .iter()
            .filter(|c| c.event_id == *event_id)
            .collect();
        Ok(inner.sorted(matches))
    }

    async fn audit_entries(&self, entity_id: &CertificateId) -> Result<Vec<AuditEntry>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .audit
            .iter()
            .filter(|e| e.entity_type == CERTIFICATE_ENTITY && e.entity_id == *entity_id)
            .cloned()
            .collect())
    }

    async fn backfill_flags(&self) -> Result<Vec<BackfillFlag>> {
        // Memory stores never hold legacy rows.
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cert_registry_core::{ActorId, NewCertificate};
    use chrono::Utc;
    use uuid::Uuid;

    fn issue(owner: Owner) -> (Certificate, AuditEntry) {
        let actor = ActorId::new();
        let now = Utc::now();
        let cert = Certificate::issue(
            NewCertificate {
                event_id: EventId::new(),
                owner,
            },
            actor,
            now,
        );
        let audit = AuditEntry::issue(&cert, actor, now);
        (cert, audit)
    }

    fn speaker() -> Owner {
        Owner::Speaker {
            speaker_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        let (cert, audit) = issue(speaker());

        assert_eq!(
            store.insert_certificate(&cert, &audit).await.unwrap(),
            InsertResult::Inserted
        );
        assert_eq!(
            store.insert_certificate(&cert, &audit).await.unwrap(),
            InsertResult::AlreadyExists
        );

        assert_eq!(store.get_certificate(&cert.id).await.unwrap(), Some(cert.clone()));
        assert_eq!(
            store.get_by_code(&cert.certificate_code).await.unwrap(),
            Some(cert.clone())
        );
        assert_eq!(store.audit_entries(&cert.id).await.unwrap(), vec![audit]);
    }

    #[tokio::test]
    async fn test_revoked_flag_is_part_of_precondition() {
        let store = MemoryStore::new();
        let (cert, audit) = issue(speaker());
        store.insert_certificate(&cert, &audit).await.unwrap();

        let actor = ActorId::new();
        let revoked = cert.revoked("withdrawn", actor, Utc::now()).unwrap();
        let revoke_entry = AuditEntry::revoke(&cert, &revoked, actor, "withdrawn", Utc::now());
        assert_eq!(
            store
                .update_certificate(Expected::of(&cert), &revoked, &revoke_entry)
                .await
                .unwrap(),
            UpdateResult::Updated
        );

        // Same version, but the caller read it before the revocation.
        let reissued = cert.reissued("fix", actor, Utc::now()).unwrap();
        let reissue_entry = AuditEntry::reissue(&cert, &reissued, actor, "fix", Utc::now());
        assert_eq!(
            store
                .update_certificate(Expected::of(&cert), &reissued, &reissue_entry)
                .await
                .unwrap(),
            UpdateResult::Stale
        );

        let loaded = store.get_certificate(&cert.id).await.unwrap().unwrap();
        assert!(loaded.is_revoked());
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_audit_id_leaves_state_untouched() {
        let store = MemoryStore::new();
        let (cert, audit) = issue(speaker());
        store.insert_certificate(&cert, &audit).await.unwrap();

        let actor = ActorId::new();
        let next = cert.reissued("fix", actor, Utc::now()).unwrap();
        let mut entry = AuditEntry::reissue(&cert, &next, actor, "fix", Utc::now());
        entry.id = audit.id;

        let err = store
            .update_certificate(Expected::of(&cert), &next, &entry)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(store.get_certificate(&cert.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_list_by_owner_filters_on_type_and_reference() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        let as_speaker = Owner::Speaker { speaker_id: id };
        let as_session = Owner::Session { session_id: id };

        let (c1, a1) = issue(as_speaker);
        let (c2, a2) = issue(as_session);
        store.insert_certificate(&c1, &a1).await.unwrap();
        store.insert_certificate(&c2, &a2).await.unwrap();

        let found = store.list_by_owner(&as_speaker).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, c1.id);
        assert!(store.backfill_flags().await.unwrap().is_empty());
    }
}
