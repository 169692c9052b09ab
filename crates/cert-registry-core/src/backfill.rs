//! Owner resolution for legacy rows that predate the discriminator.
//!
//! Legacy certificates carried five nullable foreign keys and no tag. When
//! the discriminator was introduced every row was assigned a tag. Rows with
//! more than one key populated are resolved by [`BACKFILL_PRIORITY`] (most
//! specific entity wins) and reported as ambiguous so they can be reviewed.
//!
//! This is a one-time migration policy. Runtime writes never consult it.

use crate::error::CoreError;
use crate::owner::{Owner, OwnerColumns, OwnerType};

/// Precedence applied when several legacy references are set.
pub const BACKFILL_PRIORITY: [OwnerType; 5] = [
    OwnerType::BlockEnrollment,
    OwnerType::Session,
    OwnerType::Speaker,
    OwnerType::Attendee,
    OwnerType::Organizer,
];

/// How a legacy row was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// Exactly one legacy reference was set.
    Clean(Owner),
    /// Several references were set; `owner` follows the priority order.
    Ambiguous {
        owner: Owner,
        /// Every populated owner type, in priority order.
        populated: Vec<OwnerType>,
    },
}

impl BackfillOutcome {
    pub fn owner(&self) -> Owner {
        match self {
            BackfillOutcome::Clean(owner) | BackfillOutcome::Ambiguous { owner, .. } => *owner,
        }
    }

    /// The resolved row with only the winning reference kept.
    pub fn columns(&self) -> OwnerColumns {
        self.owner().to_columns()
    }
}

/// Resolve the owner of a legacy row.
pub fn resolve_legacy_owner(legacy: &OwnerColumns) -> Result<BackfillOutcome, CoreError> {
    let populated: Vec<OwnerType> = BACKFILL_PRIORITY
        .into_iter()
        .filter(|t| legacy.get(*t).is_some())
        .collect();

    let winner = *populated.first().ok_or(CoreError::NoLegacyOwner)?;
    let reference = legacy.get(winner).ok_or(CoreError::NoLegacyOwner)?;
    let owner = Owner::new(winner, reference);

    if populated.len() == 1 {
        Ok(BackfillOutcome::Clean(owner))
    } else {
        Ok(BackfillOutcome::Ambiguous { owner, populated })
    }
}
