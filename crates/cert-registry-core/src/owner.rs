//! Owner discriminator: which single entity a certificate belongs to.
//!
//! A certificate is owned by exactly one of five entity kinds. In the
//! application layer this is the [`Owner`] sum type, which cannot express zero
//! or two owners. In storage it is a discriminator column plus five nullable
//! reference columns ([`OwnerColumns`]), guarded by the CHECK expression from
//! [`owner_check_sql`] so that direct writes cannot bypass the rule.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// The owner discriminator tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnerType {
    Attendee,
    Speaker,
    Organizer,
    BlockEnrollment,
    Session,
}

impl OwnerType {
    /// Every owner type, in declaration order.
    pub const ALL: [OwnerType; 5] = [
        OwnerType::Attendee,
        OwnerType::Speaker,
        OwnerType::Organizer,
        OwnerType::BlockEnrollment,
        OwnerType::Session,
    ];

    /// The persisted tag value.
    pub const fn as_str(self) -> &'static str {
        match self {
            OwnerType::Attendee => "ATTENDEE",
            OwnerType::Speaker => "SPEAKER",
            OwnerType::Organizer => "ORGANIZER",
            OwnerType::BlockEnrollment => "BLOCK_ENROLLMENT",
            OwnerType::Session => "SESSION",
        }
    }

    /// The reference column this tag selects.
    pub const fn column(self) -> &'static str {
        match self {
            OwnerType::Attendee => "registration_id",
            OwnerType::Speaker => "speaker_id",
            OwnerType::Organizer => "user_id",
            OwnerType::BlockEnrollment => "block_enrollment_id",
            OwnerType::Session => "session_id",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OwnerType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownOwnerType(s.to_string()))
    }
}

/// The entity a certificate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "ownerType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Owner {
    /// An attendee, referenced through their event registration.
    #[serde(rename_all = "camelCase")]
    Attendee { registration_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Speaker { speaker_id: Uuid },
    /// An organizer, referenced through their user account.
    #[serde(rename_all = "camelCase")]
    Organizer { user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    BlockEnrollment { block_enrollment_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Session { session_id: Uuid },
}

impl Owner {
    /// Build an owner from a tag and its single reference.
    pub const fn new(owner_type: OwnerType, reference: Uuid) -> Self {
        match owner_type {
            OwnerType::Attendee => Owner::Attendee {
                registration_id: reference,
            },
            OwnerType::Speaker => Owner::Speaker {
                speaker_id: reference,
            },
            OwnerType::Organizer => Owner::Organizer { user_id: reference },
            OwnerType::BlockEnrollment => Owner::BlockEnrollment {
                block_enrollment_id: reference,
            },
            OwnerType::Session => Owner::Session {
                session_id: reference,
            },
        }
    }

    /// The discriminator tag.
    pub const fn owner_type(&self) -> OwnerType {
        match self {
            Owner::Attendee { .. } => OwnerType::Attendee,
            Owner::Speaker { .. } => OwnerType::Speaker,
            Owner::Organizer { .. } => OwnerType::Organizer,
            Owner::BlockEnrollment { .. } => OwnerType::BlockEnrollment,
            Owner::Session { .. } => OwnerType::Session,
        }
    }

    /// The single owner reference.
    pub const fn reference(&self) -> Uuid {
        match *self {
            Owner::Attendee { registration_id } => registration_id,
            Owner::Speaker { speaker_id } => speaker_id,
            Owner::Organizer { user_id } => user_id,
            Owner::BlockEnrollment {
                block_enrollment_id,
            } => block_enrollment_id,
            Owner::Session { session_id } => session_id,
        }
    }

    /// Flatten into the five-column representation.
    pub fn to_columns(&self) -> OwnerColumns {
        let mut columns = OwnerColumns::default();
        columns.set(self.owner_type(), Some(self.reference()));
        columns
    }

    /// Rebuild an owner from a tag and the five reference columns.
    ///
    /// Succeeds only when the tagged column is set and the other four are
    /// null.
    pub fn from_columns(owner_type: OwnerType, columns: &OwnerColumns) -> Result<Self, CoreError> {
        let reference = columns.get(owner_type).ok_or_else(|| {
            CoreError::InvalidOwnerConfiguration(format!(
                "owner type {} requires {}",
                owner_type,
                owner_type.column()
            ))
        })?;

        let stray: Vec<&'static str> = OwnerType::ALL
            .into_iter()
            .filter(|t| *t != owner_type && columns.get(*t).is_some())
            .map(OwnerType::column)
            .collect();

        if !stray.is_empty() {
            return Err(CoreError::InvalidOwnerConfiguration(format!(
                "owner type {} forbids {}",
                owner_type,
                stray.join(", ")
            )));
        }

        Ok(Owner::new(owner_type, reference))
    }
}

/// Flat owner references, one nullable column per owner type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerColumns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_enrollment_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}

impl OwnerColumns {
    /// Read the column selected by `owner_type`.
    pub const fn get(&self, owner_type: OwnerType) -> Option<Uuid> {
        match owner_type {
            OwnerType::Attendee => self.registration_id,
            OwnerType::Speaker => self.speaker_id,
            OwnerType::Organizer => self.user_id,
            OwnerType::BlockEnrollment => self.block_enrollment_id,
            OwnerType::Session => self.session_id,
        }
    }

    /// Write the column selected by `owner_type`.
    pub fn set(&mut self, owner_type: OwnerType, value: Option<Uuid>) {
        let slot = match owner_type {
            OwnerType::Attendee => &mut self.registration_id,
            OwnerType::Speaker => &mut self.speaker_id,
            OwnerType::Organizer => &mut self.user_id,
            OwnerType::BlockEnrollment => &mut self.block_enrollment_id,
            OwnerType::Session => &mut self.session_id,
        };
        *slot = value;
    }

    /// Owner types whose column is non-null, in declaration order.
    pub fn populated(&self) -> Vec<OwnerType> {
        OwnerType::ALL
            .into_iter()
            .filter(|t| self.get(*t).is_some())
            .collect()
    }
}

/// The storage CHECK expression for the owner invariant.
///
/// A disjunction of five mutually exclusive conjunctions, one per owner type:
/// the tag matches, its column is non-null and the other four are null.
pub fn owner_check_sql() -> String {
    let branches: Vec<String> = OwnerType::ALL
        .into_iter()
        .map(|tag| {
            let mut terms = vec![
                format!("owner_type = '{}'", tag.as_str()),
                format!("{} IS NOT NULL", tag.column()),
            ];
            terms.extend(
                OwnerType::ALL
                    .into_iter()
                    .filter(|other| *other != tag)
                    .map(|other| format!("{} IS NULL", other.column())),
            );
            format!("({})", terms.join(" AND "))
        })
        .collect();

    branches.join("\n            OR ")
}
