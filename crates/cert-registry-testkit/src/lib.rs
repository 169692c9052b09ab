//! # Certificate Registry Testkit
//!
//! Testing utilities for the certificate registry.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a ready-made service with a known actor and event
//! - **Generators**: Proptest strategies for owners, legacy reference
//!   columns and lifecycle step sequences
//!
//! ## Test Fixtures
//!
//! ```rust
//! use cert_registry_testkit::TestFixture;
//!
//! # async fn run() {
//! let fixture = TestFixture::new();
//! let cert = fixture.issue_attendee().await;
//! assert_eq!(cert.version, 1);
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use cert_registry_testkit::generators::owner;
//!
//! proptest! {
//!     #[test]
//!     fn owner_columns_round_trip(owner in owner()) {
//!         let columns = owner.to_columns();
//!         prop_assert_eq!(columns.populated().len(), 1);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{sample_owner, TestFixture};
pub use generators::{LifecycleStep, RawCertificateParams};
