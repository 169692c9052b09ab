//! The certificate record and its lifecycle transitions.
//!
//! Transitions never mutate in place: [`Certificate::reissued`] and
//! [`Certificate::revoked`] return the next value and leave the current one
//! untouched, so callers hold both the before and after state for auditing
//! and for the optimistic update precondition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, LifecycleError};
use crate::owner::Owner;
use crate::types::{ActorId, CertificateId, EventId};

/// Input for issuing a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCertificate {
    pub event_id: EventId,
    #[serde(flatten)]
    pub owner: Owner,
}

/// A snapshot of the certificate as it was before a reissue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionHistoryEntry {
    /// The version that was superseded.
    pub version: u32,
    pub owner: Owner,
    /// When the superseding reissue happened.
    pub recorded_at: DateTime<Utc>,
    pub reason: String,
    pub actor_id: ActorId,
}

/// Revocation state. Once present the certificate is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revocation {
    pub revoked_at: DateTime<Utc>,
    pub reason: String,
    pub revoked_by: ActorId,
}

/// Metadata of the most recent reissue. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastReissue {
    pub reissued_at: DateTime<Utc>,
    pub reissued_by: ActorId,
}

/// A certificate record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: CertificateId,
    pub event_id: EventId,
    #[serde(flatten)]
    pub owner: Owner,
    /// Public verification code printed on the certificate.
    pub certificate_code: String,
    pub issued_at: DateTime<Utc>,
    pub issued_by: ActorId,
    pub version: u32,
    pub version_history: Vec<VersionHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation: Option<Revocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reissue: Option<LastReissue>,
}

impl Certificate {
    /// Issue a new certificate at version 1 with an empty history.
    pub fn issue(new: NewCertificate, issued_by: ActorId, now: DateTime<Utc>) -> Self {
        let id = CertificateId::new();
        Self {
            id,
            event_id: new.event_id,
            owner: new.owner,
            certificate_code: certificate_code(id.as_uuid()),
            issued_at: now,
            issued_by,
            version: 1,
            version_history: Vec::new(),
            revocation: None,
            last_reissue: None,
        }
    }

    /// Whether the certificate has been revoked.
    pub fn is_revoked(&self) -> bool {
        self.revocation.is_some()
    }

    /// The next state after a reissue.
    ///
    /// Appends the pre-reissue state to the history and bumps the version by
    /// exactly one. Revoked certificates cannot be reissued.
    pub fn reissued(
        &self,
        reason: &str,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Result<Certificate, LifecycleError> {
        if self.is_revoked() {
            return Err(LifecycleError::Revoked(self.id));
        }

        let version = self
            .version
            .checked_add(1)
            .ok_or(LifecycleError::VersionOverflow(self.id))?;

        let mut next = self.clone();
        next.version_history.push(VersionHistoryEntry {
            version: self.version,
            owner: self.owner,
            recorded_at: now,
            reason: reason.to_string(),
            actor_id: actor,
        });
        next.version = version;
        next.last_reissue = Some(LastReissue {
            reissued_at: now,
            reissued_by: actor,
        });

        Ok(next)
    }

    /// The next state after a revocation.
    pub fn revoked(
        &self,
        reason: &str,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Result<Certificate, LifecycleError> {
        if let Some(existing) = &self.revocation {
            return Err(LifecycleError::AlreadyRevoked {
                id: self.id,
                revoked_at: existing.revoked_at,
            });
        }

        let mut next = self.clone();
        next.revocation = Some(Revocation {
            revoked_at: now,
            reason: reason.to_string(),
            revoked_by: actor,
        });
        Ok(next)
    }

    /// Verify the version/history bookkeeping.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.version == 0 {
            return Err(CoreError::CorruptHistory("version must be positive".into()));
        }

        let expected = (self.version - 1) as usize;
        if self.version_history.len() != expected {
            return Err(CoreError::CorruptHistory(format!(
                "version {} requires {} history entries, found {}",
                self.version,
                expected,
                self.version_history.len()
            )));
        }

        for (index, entry) in self.version_history.iter().enumerate() {
            if entry.version as usize != index + 1 {
                return Err(CoreError::CorruptHistory(format!(
                    "history entry {} records version {}",
                    index, entry.version
                )));
            }
        }

        Ok(())
    }

    /// The state captured in audit before/after values.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "version": self.version,
            "owner": self.owner,
            "revokedAt": self.revocation.as_ref().map(|r| r.revoked_at),
            "revokedReason": self.revocation.as_ref().map(|r| r.reason.clone()),
            "revokedById": self.revocation.as_ref().map(|r| r.revoked_by),
            "lastReissuedAt": self.last_reissue.as_ref().map(|r| r.reissued_at),
            "lastReissuedById": self.last_reissue.as_ref().map(|r| r.reissued_by),
        })
    }
}

/// Derive the public verification code from the certificate id.
fn certificate_code(id: &Uuid) -> String {
    let hex = id.simple().to_string().to_uppercase();
    format!("CERT-{}-{}-{}", &hex[0..4], &hex[4..8], &hex[8..12])
}
