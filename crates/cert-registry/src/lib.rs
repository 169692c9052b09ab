//! # Certificate Registry
//!
//! Ownership, versioning and reissuance of event certificates.
//!
//! ## Overview
//!
//! A certificate belongs to exactly one owner (attendee registration,
//! speaker, organizer, block enrollment or session), carries a version that
//! increases by one on every reissue together with an append-only history of
//! prior states, and may be revoked. Every state change writes one audit
//! entry in the same transaction.
//!
//! ## Key Concepts
//!
//! - **Owner discriminator**: the tag naming which kind of entity owns a
//!   certificate. Modeled as the [`Owner`] sum type.
//! - **Version history**: one entry per reissue, oldest first.
//! - **Revocation**: terminal. Revoked certificates cannot be reissued.
//! - **Bulk reissue**: independent per-item reissues with a report.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cert_registry::{Actor, CertificateService, ServiceConfig, StaticDirectory};
//! use cert_registry::core::{ActorId, EventId, NewCertificate, Owner};
//! use cert_registry::store::SqliteStore;
//! use uuid::Uuid;
//!
//! async fn example() {
//!     let actor = ActorId::new();
//!     let directory = StaticDirectory::with_actors([Actor::new(actor, "Registrar")]);
//!     let store = SqliteStore::open("certificates.db").unwrap();
//!     let service = CertificateService::new(store, directory, ServiceConfig::default());
//!
//!     let cert = service
//!         .issue(
//!             NewCertificate {
//!                 event_id: EventId::new(),
//!                 owner: Owner::Attendee { registration_id: Uuid::new_v4() },
//!             },
//!             actor,
//!         )
//!         .await
//!         .unwrap();
//!
//!     let cert = service.reissue(cert.id, "typo in name", actor).await.unwrap();
//!     assert_eq!(cert.version, 2);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `cert_registry::core` - Domain types and transitions
//! - `cert_registry::store` - Storage abstraction and SQLite

pub mod api;
pub mod config;
pub mod directory;
pub mod error;
pub mod service;

pub use cert_registry_core as core;
pub use cert_registry_store as store;

pub use api::{
    BulkItemResult, BulkReissueReport, BulkReissueRequest, IssueRequest, ReissueRequest,
    RevokeRequest,
};
pub use config::ServiceConfig;
pub use directory::{Actor, ActorDirectory, StaticDirectory};
pub use error::{Result, ServiceError};
pub use service::CertificateService;

pub use cert_registry_core::{
    ActorId, AuditAction, AuditEntry, Certificate, CertificateId, EventId, NewCertificate, Owner,
    OwnerType,
};
