//! # Certificate Registry Store
//!
//! Storage abstraction for the certificate registry. Provides a trait-based
//! interface for certificate persistence with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! The store module abstracts certificate storage behind the
//! [`CertificateStore`] trait, allowing the service to be storage-agnostic.
//! The primary implementation is [`SqliteStore`], with [`MemoryStore`] for
//! testing.
//!
//! ## Key Types
//!
//! - [`CertificateStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`Expected`] - Optimistic precondition for updates
//! - [`BackfillFlag`] - Legacy row resolved by priority during migration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cert_registry_store::{CertificateStore, SqliteStore};
//!
//! async fn example() {
//!     // Open a SQLite database (runs migrations)
//!     let store = SqliteStore::open("certificates.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let flagged = store.backfill_flags().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Owner constraint**: exactly one reference column matching `owner_type`,
//!   enforced by a named CHECK constraint
//! - **Atomic audit**: every certificate write carries its audit entry
//! - **Optimistic updates**: stale writers get [`UpdateResult::Stale`]

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{BackfillFlag, CertificateStore, Expected, InsertResult, UpdateResult};
