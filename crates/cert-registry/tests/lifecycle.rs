//! End-to-end lifecycle tests, run against both store implementations.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;

use cert_registry::core::{AuditEntry, CertificateId, EventId, Owner, OwnerType};
use cert_registry::store::{
    self, BackfillFlag, CertificateStore, Expected, InsertResult, MemoryStore, SqliteStore,
    UpdateResult,
};
use cert_registry::{
    AuditAction, BulkReissueRequest, Certificate, IssueRequest, ServiceConfig, ServiceError,
};
use cert_registry_testkit::generators::{lifecycle_steps, LifecycleStep};
use cert_registry_testkit::{sample_owner, TestFixture};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Generate one `#[tokio::test]` per store for each scenario function.
macro_rules! for_each_store {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test]
                async fn $name() {
                    super::init_tracing();
                    super::$name(cert_registry_testkit::TestFixture::new()).await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test]
                async fn $name() {
                    super::init_tracing();
                    super::$name(cert_registry_testkit::TestFixture::sqlite()).await;
                }
            )*
        }
    };
}

for_each_store!(
    scenario_a_issue_attendee,
    scenario_b_reissue,
    scenario_c_revoke_is_terminal,
    scenario_d_bulk_partial_failure,
    bulk_input_errors_abort_before_any_write,
    bulk_duplicate_ids_are_processed_in_order,
    bulk_reports_revoked_items,
    every_change_has_one_audit_entry,
    issue_request_owner_mismatch,
    queries_by_owner_event_and_code,
);

async fn scenario_a_issue_attendee<S: CertificateStore>(fx: TestFixture<S>) {
    let registration_id = Uuid::new_v4();
    let cert = fx.issue(Owner::Attendee { registration_id }).await;

    assert_eq!(cert.owner.owner_type(), OwnerType::Attendee);
    assert_eq!(cert.owner.to_columns().registration_id, Some(registration_id));
    assert_eq!(cert.owner.to_columns().populated(), vec![OwnerType::Attendee]);
    assert_eq!(cert.version, 1);
    assert!(cert.version_history.is_empty());
    assert!(cert.revocation.is_none());

    let stored = fx.service.get(&cert.id).await.unwrap();
    assert_eq!(stored, cert);
}

async fn scenario_b_reissue<S: CertificateStore>(fx: TestFixture<S>) {
    let cert = fx.issue_attendee().await;

    let reissued = fx
        .service
        .reissue(cert.id, "typo in name", fx.actor_id())
        .await
        .unwrap();

    assert_eq!(reissued.version, 2);
    assert_eq!(reissued.version_history.len(), 1);
    let entry = &reissued.version_history[0];
    assert_eq!(entry.version, 1);
    assert_eq!(entry.owner, cert.owner);
    assert_eq!(entry.reason, "typo in name");
    assert_eq!(entry.actor_id, fx.actor_id());

    let last = reissued.last_reissue.as_ref().unwrap();
    assert_eq!(last.reissued_by, fx.actor_id());
    assert_eq!(fx.service.get(&cert.id).await.unwrap(), reissued);
}

async fn scenario_c_revoke_is_terminal<S: CertificateStore>(fx: TestFixture<S>) {
    let cert = fx.issue_attendee().await;

    let revoked = fx
        .service
        .revoke(cert.id, "event cancelled", fx.actor_id())
        .await
        .unwrap();
    let revocation = revoked.revocation.clone().unwrap();
    assert_eq!(revocation.reason, "event cancelled");
    assert_eq!(revocation.revoked_by, fx.actor_id());

    let err = fx
        .service
        .revoke(cert.id, "again", fx.actor_id())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ServiceError::AlreadyRevoked {
            id: cert.id,
            revoked_at: revocation.revoked_at,
        }
    );
    assert_eq!(err.status_code(), 409);

    // The failed second revoke left the first one in place.
    assert_eq!(fx.service.get(&cert.id).await.unwrap(), revoked);
}

async fn scenario_d_bulk_partial_failure<S: CertificateStore>(fx: TestFixture<S>) {
    let c1 = fx.issue_attendee().await;
    let c2 = CertificateId::new();
    let c3 = fx.issue(sample_owner(OwnerType::Speaker)).await;

    let request = BulkReissueRequest {
        certificate_ids: vec![c1.id.to_string(), c2.to_string(), c3.id.to_string()],
        reason: "batch fix".into(),
    };
    let report = fx
        .service
        .bulk_reissue_certificates(&request, fx.actor_id())
        .await
        .unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.successful, 2);
    assert_eq!(report.failed, 1);

    let summary: Vec<_> = report
        .results
        .iter()
        .map(|r| (r.certificate_id, r.success, r.error.as_deref(), r.new_version))
        .collect();
    assert_eq!(
        summary,
        vec![
            (c1.id, true, None, Some(2)),
            (c2, false, Some("not found"), None),
            (c3.id, true, None, Some(2)),
        ]
    );

    assert_eq!(fx.service.get(&c1.id).await.unwrap().version, 2);
    assert_eq!(fx.service.get(&c3.id).await.unwrap().version, 2);
}

async fn bulk_input_errors_abort_before_any_write<S: CertificateStore>(fx: TestFixture<S>) {
    let cert = fx.issue_attendee().await;

    let cases = [
        (vec![], "batch fix"),
        (vec![cert.id.to_string(), "C2-nonexistent".into()], "batch fix"),
        (vec![cert.id.to_string()], "   "),
    ];
    for (ids, reason) in cases {
        let request = BulkReissueRequest {
            certificate_ids: ids,
            reason: reason.into(),
        };
        let err = fx
            .service
            .bulk_reissue_certificates(&request, fx.actor_id())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "{err:?}");
        assert_eq!(err.status_code(), 400);
    }

    assert_eq!(fx.service.get(&cert.id).await.unwrap().version, 1);
}

async fn bulk_duplicate_ids_are_processed_in_order<S: CertificateStore>(fx: TestFixture<S>) {
    let cert = fx.issue_attendee().await;
    let request = BulkReissueRequest {
        certificate_ids: vec![cert.id.to_string(), cert.id.to_string()],
        reason: "twice".into(),
    };

    let report = fx
        .service
        .bulk_reissue_certificates(&request, fx.actor_id())
        .await
        .unwrap();

    let versions: Vec<_> = report.results.iter().map(|r| r.new_version).collect();
    assert_eq!(versions, vec![Some(2), Some(3)]);
    assert_eq!(fx.service.get(&cert.id).await.unwrap().version_history.len(), 2);
}

async fn bulk_reports_revoked_items<S: CertificateStore>(fx: TestFixture<S>) {
    let live = fx.issue_attendee().await;
    let dead = fx.issue_attendee().await;
    fx.service
        .revoke(dead.id, "withdrawn", fx.actor_id())
        .await
        .unwrap();

    let request = BulkReissueRequest {
        certificate_ids: vec![dead.id.to_string(), live.id.to_string()],
        reason: "batch fix".into(),
    };
    let report = fx
        .service
        .bulk_reissue_certificates(&request, fx.actor_id())
        .await
        .unwrap();

    assert_eq!((report.successful, report.failed), (1, 1));
    assert_eq!(
        report.results[0].error.as_deref(),
        Some("certificate is revoked")
    );
    assert_eq!(report.results[1].new_version, Some(2));
}

async fn every_change_has_one_audit_entry<S: CertificateStore>(fx: TestFixture<S>) {
    let cert = fx.issue_attendee().await;
    fx.service.reissue(cert.id, "first", fx.actor_id()).await.unwrap();
    fx.service.reissue(cert.id, "second", fx.actor_id()).await.unwrap();
    fx.service.revoke(cert.id, "done", fx.actor_id()).await.unwrap();
    let _ = fx.service.revoke(cert.id, "again", fx.actor_id()).await;
    let _ = fx.service.reissue(cert.id, "too late", fx.actor_id()).await;

    let trail = fx.service.audit_trail(&cert.id).await.unwrap();
    let actions: Vec<_> = trail.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Issue,
            AuditAction::Reissue,
            AuditAction::Reissue,
            AuditAction::Revoke,
        ]
    );

    for entry in &trail {
        assert_eq!(entry.entity_id, cert.id);
        assert_eq!(entry.actor_id, fx.actor_id());
        assert_eq!(entry.actor_label.as_deref(), Some("Test Registrar"));
    }

    let revoke = &trail[3];
    assert_eq!(revoke.reason.as_deref(), Some("done"));
    assert_eq!(revoke.previous_values.as_ref().unwrap()["revokedAt"], serde_json::Value::Null);
    assert!(revoke.new_values["revokedAt"].is_string());
    assert_eq!(trail[2].new_values["version"], 3);
}

async fn issue_request_owner_mismatch<S: CertificateStore>(fx: TestFixture<S>) {
    let request: IssueRequest = serde_json::from_value(serde_json::json!({
        "eventId": fx.event_id.to_string(),
        "ownerType": "SESSION",
        "sessionId": Uuid::new_v4().to_string(),
        "speakerId": Uuid::new_v4().to_string(),
    }))
    .unwrap();

    let err = fx
        .service
        .issue_from_request(request, fx.actor_id())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOwnerConfiguration(_)));
    assert_eq!(err.status_code(), 422);
    assert!(fx.service.list_for_event(&fx.event_id).await.unwrap().is_empty());
}

async fn queries_by_owner_event_and_code<S: CertificateStore>(fx: TestFixture<S>) {
    let session = sample_owner(OwnerType::Session);
    let first = fx.issue(session).await;
    let second = fx.issue(session).await;
    let other = fx.issue(sample_owner(OwnerType::BlockEnrollment)).await;

    let owned: Vec<_> = fx
        .service
        .list_for_owner(&session)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(owned, vec![first.id, second.id]);

    assert_eq!(fx.service.list_for_event(&fx.event_id).await.unwrap().len(), 3);
    assert!(fx
        .service
        .list_for_event(&EventId::new())
        .await
        .unwrap()
        .is_empty());

    let found = fx
        .service
        .get_by_code(&other.certificate_code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, other.id);
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────────────────────

/// Store wrapper that lets a competing writer commit between the service's
/// read and its first write.
struct Interleaved<S> {
    inner: S,
    raced: AtomicBool,
}

impl<S> Interleaved<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            raced: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<S: CertificateStore> CertificateStore for Interleaved<S> {
    async fn insert_certificate(
        &self,
        cert: &Certificate,
        audit: &AuditEntry,
    ) -> store::Result<InsertResult> {
        self.inner.insert_certificate(cert, audit).await
    }

    async fn update_certificate(
        &self,
        expected: Expected,
        cert: &Certificate,
        audit: &AuditEntry,
    ) -> store::Result<UpdateResult> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let current = self.inner.get_certificate(&cert.id).await?.unwrap();
            let actor = current.issued_by;
            let rival = current.reissued("rival", actor, Utc::now()).unwrap();
            let entry = AuditEntry::reissue(&current, &rival, actor, "rival", Utc::now());
            let won = self
                .inner
                .update_certificate(Expected::of(&current), &rival, &entry)
                .await?;
            assert_eq!(won, UpdateResult::Updated);
        }
        self.inner.update_certificate(expected, cert, audit).await
    }

    async fn get_certificate(&self, id: &CertificateId) -> store::Result<Option<Certificate>> {
        self.inner.get_certificate(id).await
    }

    async fn get_by_code(&self, code: &str) -> store::Result<Option<Certificate>> {
        self.inner.get_by_code(code).await
    }

    async fn list_by_owner(&self, owner: &Owner) -> store::Result<Vec<Certificate>> {
        self.inner.list_by_owner(owner).await
    }

    async fn list_by_event(&self, event_id: &EventId) -> store::Result<Vec<Certificate>> {
        self.inner.list_by_event(event_id).await
    }

    async fn audit_entries(&self, entity_id: &CertificateId) -> store::Result<Vec<AuditEntry>> {
        self.inner.audit_entries(entity_id).await
    }

    async fn backfill_flags(&self) -> store::Result<Vec<BackfillFlag>> {
        self.inner.backfill_flags().await
    }
}

async fn losing_writer_gets_conflict<S: CertificateStore>(store: S) {
    let fx = TestFixture::with_store(Interleaved::new(store));
    let cert = fx.issue_attendee().await;

    let err = fx
        .service
        .reissue(cert.id, "loser", fx.actor_id())
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::ConcurrentModification(cert.id));

    // Only the rival's reissue landed, and the history has no gap.
    let stored = fx.service.get(&cert.id).await.unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.version_history.len(), 1);
    assert_eq!(stored.version_history[0].reason, "rival");
    assert_eq!(fx.service.audit_trail(&cert.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_reissue_memory() {
    losing_writer_gets_conflict(MemoryStore::new()).await;
}

#[tokio::test]
async fn concurrent_reissue_sqlite() {
    losing_writer_gets_conflict(SqliteStore::open_memory().unwrap()).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Legacy data
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn legacy_rows_are_served_after_backfill() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");

    let ambiguous = Uuid::new_v4();
    let block = Uuid::new_v4();
    {
        let mut conn = rusqlite::Connection::open(&path).unwrap();
        store::migration::migrate_to(&mut conn, 1).unwrap();
        conn.execute(
            "INSERT INTO certificates (
                id, event_id, certificate_code, registration_id, block_enrollment_id,
                issued_at, issued_by
            ) VALUES (?1, ?2, 'LEGACY-1', ?3, ?4, '2023-04-01 10:00:00+00:00', ?5)",
            rusqlite::params![
                ambiguous.to_string(),
                Uuid::new_v4().to_string(),
                Uuid::new_v4().to_string(),
                block.to_string(),
                Uuid::new_v4().to_string(),
            ],
        )
        .unwrap();
    }

    let fx = TestFixture::with_store(SqliteStore::open(&path).unwrap());
    let id = CertificateId::from_uuid(ambiguous);

    let cert = fx.service.get(&id).await.unwrap();
    assert_eq!(
        cert.owner,
        Owner::BlockEnrollment {
            block_enrollment_id: block
        }
    );
    assert_eq!(cert.version, 1);

    let flags = fx.service.store().backfill_flags().await.unwrap();
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].certificate_id, id);
    assert_eq!(flags[0].chosen, OwnerType::BlockEnrollment);
    assert_eq!(
        flags[0].populated,
        vec![OwnerType::BlockEnrollment, OwnerType::Attendee]
    );

    // Backfilled rows take part in the normal lifecycle.
    let reissued = fx.service.reissue(id, "migrated", fx.actor_id()).await.unwrap();
    assert_eq!(reissued.version, 2);
}

#[tokio::test]
async fn bulk_limit_comes_from_config() {
    let config = ServiceConfig {
        max_bulk_items: 1,
        ..Default::default()
    };
    let fx = TestFixture::with_config(MemoryStore::new(), config);
    let request = BulkReissueRequest {
        certificate_ids: vec![CertificateId::new().to_string(), CertificateId::new().to_string()],
        reason: "fix".into(),
    };

    let err = fx
        .service
        .bulk_reissue_certificates(&request, fx.actor_id())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

async fn apply_steps<S: CertificateStore>(fx: TestFixture<S>, steps: Vec<LifecycleStep>) {
    let cert = fx.issue_attendee().await;
    let mut version = 1;
    let mut revoked = false;
    let mut audited = 1;

    for step in steps {
        match step {
            LifecycleStep::Reissue(reason) => {
                let result = fx.service.reissue(cert.id, &reason, fx.actor_id()).await;
                if revoked {
                    assert_eq!(result.unwrap_err(), ServiceError::Revoked(cert.id));
                } else {
                    version += 1;
                    audited += 1;
                    assert_eq!(result.unwrap().version, version);
                }
            }
            LifecycleStep::Revoke(reason) => {
                let result = fx.service.revoke(cert.id, &reason, fx.actor_id()).await;
                if revoked {
                    assert!(matches!(result, Err(ServiceError::AlreadyRevoked { .. })));
                } else {
                    revoked = true;
                    audited += 1;
                    assert!(result.unwrap().is_revoked());
                }
            }
        }
    }

    let stored = fx.service.get(&cert.id).await.unwrap();
    assert_eq!(stored.version, version);
    assert_eq!(stored.version_history.len() as u32, version - 1);
    assert!(stored.check_invariants().is_ok());
    assert_eq!(stored.is_revoked(), revoked);
    assert_eq!(stored.owner.to_columns().populated().len(), 1);
    assert_eq!(fx.service.audit_trail(&cert.id).await.unwrap().len(), audited);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn lifecycle_bookkeeping_holds(steps in lifecycle_steps(12), on_sqlite in any::<bool>()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            if on_sqlite {
                apply_steps(TestFixture::sqlite(), steps).await;
            } else {
                apply_steps(TestFixture::new(), steps).await;
            }
        });
    }
}
