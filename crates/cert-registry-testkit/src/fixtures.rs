//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use uuid::Uuid;

use cert_registry::{Actor, CertificateService, ServiceConfig, StaticDirectory};
use cert_registry_core::{ActorId, Certificate, EventId, NewCertificate, Owner, OwnerType};
use cert_registry_store::{CertificateStore, MemoryStore, SqliteStore};

/// A test fixture with a registered actor, an event and a service.
pub struct TestFixture<S: CertificateStore = MemoryStore> {
    pub actor: Actor,
    pub event_id: EventId,
    pub service: CertificateService<S, StaticDirectory>,
}

impl TestFixture<MemoryStore> {
    /// Create a new fixture backed by a memory store.
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl TestFixture<SqliteStore> {
    /// Create a new fixture backed by an in-memory SQLite database.
    pub fn sqlite() -> Self {
        Self::with_store(SqliteStore::open_memory().expect("open in-memory sqlite"))
    }
}

impl Default for TestFixture<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CertificateStore> TestFixture<S> {
    /// Create a fixture around an existing store with default configuration.
    pub fn with_store(store: S) -> Self {
        Self::with_config(store, ServiceConfig::default())
    }

    pub fn with_config(store: S, config: ServiceConfig) -> Self {
        let actor = Actor::new(ActorId::new(), "Test Registrar");
        let directory = StaticDirectory::with_actors([actor.clone()]);
        Self {
            actor,
            event_id: EventId::new(),
            service: CertificateService::new(store, directory, config),
        }
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor.id
    }

    /// A new-certificate request for the fixture's event.
    pub fn new_certificate(&self, owner: Owner) -> NewCertificate {
        NewCertificate {
            event_id: self.event_id,
            owner,
        }
    }

    /// Issue a certificate to `owner`.
    pub async fn issue(&self, owner: Owner) -> Certificate {
        self.service
            .issue(self.new_certificate(owner), self.actor.id)
            .await
            .expect("issue certificate")
    }

    /// Issue a certificate to a fresh attendee registration.
    pub async fn issue_attendee(&self) -> Certificate {
        self.issue(sample_owner(OwnerType::Attendee)).await
    }
}

/// An owner of the given type with a fresh reference.
pub fn sample_owner(owner_type: OwnerType) -> Owner {
    Owner::new(owner_type, Uuid::new_v4())
}
