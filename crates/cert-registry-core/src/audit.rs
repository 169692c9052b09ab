//! Audit log entries for certificate state changes.
//!
//! Each successful issue, revoke or reissue produces exactly one entry. The
//! entry is persisted in the same transaction as the certificate change.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::certificate::Certificate;
use crate::error::CoreError;
use crate::types::{ActorId, AuditEntryId, CertificateId};

/// Entity type recorded on certificate audit entries.
pub const CERTIFICATE_ENTITY: &str = "certificate";

/// The audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Issue,
    Revoke,
    Reissue,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuditAction::Issue => "ISSUE",
            AuditAction::Revoke => "REVOKE",
            AuditAction::Reissue => "REISSUE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ISSUE" => Ok(AuditAction::Issue),
            "REVOKE" => Ok(AuditAction::Revoke),
            "REISSUE" => Ok(AuditAction::Reissue),
            other => Err(CoreError::CorruptHistory(format!(
                "unknown audit action: {}",
                other
            ))),
        }
    }
}

/// A single append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub entity_type: String,
    pub entity_id: CertificateId,
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_values: Option<serde_json::Value>,
    pub new_values: serde_json::Value,
    pub actor_id: ActorId,
    /// Display identity of the actor at the time of the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    fn new(
        action: AuditAction,
        previous: Option<&Certificate>,
        next: &Certificate,
        actor_id: ActorId,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            entity_type: CERTIFICATE_ENTITY.to_string(),
            entity_id: next.id,
            action,
            previous_values: previous.map(Certificate::snapshot),
            new_values: next.snapshot(),
            actor_id,
            actor_label: None,
            reason: reason.map(str::to_string),
            created_at: now,
        }
    }

    /// Entry for a freshly issued certificate.
    pub fn issue(cert: &Certificate, actor_id: ActorId, now: DateTime<Utc>) -> Self {
        Self::new(AuditAction::Issue, None, cert, actor_id, None, now)
    }

    pub fn revoke(
        previous: &Certificate,
        next: &Certificate,
        actor_id: ActorId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            AuditAction::Revoke,
            Some(previous),
            next,
            actor_id,
            Some(reason),
            now,
        )
    }

    pub fn reissue(
        previous: &Certificate,
        next: &Certificate,
        actor_id: ActorId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            AuditAction::Reissue,
            Some(previous),
            next,
            actor_id,
            Some(reason),
            now,
        )
    }

    /// Attach the resolved actor identity.
    pub fn with_actor_label(mut self, label: impl Into<String>) -> Self {
        self.actor_label = Some(label.into());
        self
    }
}
