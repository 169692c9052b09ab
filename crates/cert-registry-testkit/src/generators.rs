//! Proptest generators for property-based testing.

use proptest::prelude::*;
use uuid::Uuid;

use cert_registry_core::{EventId, NewCertificate, Owner, OwnerColumns, OwnerType};

/// Generate a random UUID.
pub fn uuid() -> impl Strategy<Value = Uuid> {
    any::<u128>().prop_map(Uuid::from_u128)
}

/// Generate an OwnerType.
pub fn owner_type() -> impl Strategy<Value = OwnerType> {
    prop::sample::select(OwnerType::ALL.to_vec())
}

/// Generate a well-formed owner.
pub fn owner() -> impl Strategy<Value = Owner> {
    (owner_type(), uuid()).prop_map(|(t, reference)| Owner::new(t, reference))
}

/// Generate legacy reference columns: any subset may be populated,
/// including none.
pub fn legacy_columns() -> impl Strategy<Value = OwnerColumns> {
    (
        proptest::option::of(uuid()),
        proptest::option::of(uuid()),
        proptest::option::of(uuid()),
        proptest::option::of(uuid()),
        proptest::option::of(uuid()),
    )
        .prop_map(
            |(registration_id, speaker_id, user_id, block_enrollment_id, session_id)| {
                OwnerColumns {
                    registration_id,
                    speaker_id,
                    user_id,
                    block_enrollment_id,
                    session_id,
                }
            },
        )
}

/// Generate a non-blank reason.
pub fn reason() -> impl Strategy<Value = String> {
    "[a-z][a-z ]{0,40}".prop_map(String::from)
}

/// One lifecycle operation applied to a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleStep {
    Reissue(String),
    Revoke(String),
}

/// Generate a sequence of lifecycle steps, weighted towards reissues.
pub fn lifecycle_steps(max_len: usize) -> impl Strategy<Value = Vec<LifecycleStep>> {
    let step = prop_oneof![
        4 => reason().prop_map(LifecycleStep::Reissue),
        1 => reason().prop_map(LifecycleStep::Revoke),
    ];
    prop::collection::vec(step, 0..=max_len)
}

/// Parameters for generating a new certificate.
#[derive(Debug, Clone)]
pub struct RawCertificateParams {
    pub event_id: Uuid,
    pub owner: Owner,
}

impl RawCertificateParams {
    pub fn to_new_certificate(&self) -> NewCertificate {
        NewCertificate {
            event_id: EventId::from_uuid(self.event_id),
            owner: self.owner,
        }
    }
}

impl Arbitrary for RawCertificateParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (uuid(), owner())
            .prop_map(|(event_id, owner)| RawCertificateParams { event_id, owner })
            .boxed()
    }
}
