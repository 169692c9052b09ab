//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration transforms the
//! schema from version N to N+1 inside one transaction.
//!
//! - v1: the legacy schema. Certificates carry five nullable owner columns
//!   and no discriminator.
//! - v2: the discriminated schema. Rebuilds `certificates` with `owner_type`,
//!   versioning columns and CHECK constraints, backfilling every legacy row
//!   through [`resolve_legacy_owner`].

use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use tracing::{info, warn};

use cert_registry_core::{owner_check_sql, resolve_legacy_owner, BackfillOutcome, OwnerColumns};

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Name of the owner CHECK constraint, reported in SQLite error messages.
pub const OWNER_CHECK: &str = "certificates_owner_check";

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    migrate_to(conn, CURRENT_VERSION)
}

/// Migrate up to (and including) `target`.
pub fn migrate_to(conn: &mut Connection, target: u32) -> Result<()> {
    if target > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            target
        )));
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current = schema_version(conn)?;

    if current < target {
        let tx = conn.transaction()?;

        for version in (current + 1)..=target {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, Utc::now().timestamp_millis()],
            )?;
        }

        tx.commit()?;
        info!(from = current, to = target, "schema migrated");
    }

    Ok(())
}

/// The highest applied migration, or 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply a specific migration version.
fn apply_migration(tx: &Transaction<'_>, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(tx),
        2 => apply_v2(tx),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: legacy schema.
fn apply_v1(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        r#"
        -- Certificates: owner is whichever reference column happens to be set
        CREATE TABLE certificates (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            certificate_code TEXT NOT NULL UNIQUE,
            registration_id TEXT,
            speaker_id TEXT,
            user_id TEXT,
            block_enrollment_id TEXT,
            session_id TEXT,
            issued_at TEXT NOT NULL,
            issued_by TEXT NOT NULL,
            revoked_at TEXT,
            revoked_reason TEXT,
            revoked_by_id TEXT
        );

        -- Append-only audit log
        CREATE TABLE audit_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            action TEXT NOT NULL,
            previous_values TEXT,
            new_values TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            actor_label TEXT,
            reason TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX idx_audit_entity ON audit_log(entity_type, entity_id);
        "#,
    )?;

    Ok(())
}

/// Migration v2: owner discriminator, versioning and constraints.
fn apply_v2(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(&format!(
        r#"
        CREATE TABLE certificates_v2 (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            certificate_code TEXT NOT NULL UNIQUE,
            owner_type TEXT NOT NULL,
            registration_id TEXT,
            speaker_id TEXT,
            user_id TEXT,
            block_enrollment_id TEXT,
            session_id TEXT,
            issued_at TEXT NOT NULL,
            issued_by TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            version_history TEXT NOT NULL DEFAULT '[]',
            revoked_at TEXT,
            revoked_reason TEXT,
            revoked_by_id TEXT,
            last_reissued_at TEXT,
            last_reissued_by_id TEXT,

            CONSTRAINT {owner_check} CHECK (
            {owner_sql}
            ),
            CONSTRAINT certificates_version_check CHECK (version >= 1),
            CONSTRAINT certificates_history_check CHECK (
                json_valid(version_history)
                AND json_array_length(version_history) = version - 1
            ),
            CONSTRAINT certificates_revocation_check CHECK (
                (revoked_at IS NULL) = (revoked_reason IS NULL)
                AND (revoked_at IS NULL) = (revoked_by_id IS NULL)
            )
        );

        -- Legacy rows resolved by priority because several references were set
        CREATE TABLE owner_backfill_flags (
            certificate_id TEXT PRIMARY KEY,
            chosen_owner_type TEXT NOT NULL,
            populated TEXT NOT NULL,          -- JSON array of owner types
            flagged_at TEXT NOT NULL
        );
        "#,
        owner_check = OWNER_CHECK,
        owner_sql = owner_check_sql(),
    ))?;

    let legacy = {
        let mut stmt = tx.prepare(
            "SELECT id, event_id, certificate_code, registration_id, speaker_id, user_id,
                    block_enrollment_id, session_id, issued_at, issued_by,
                    revoked_at, revoked_reason, revoked_by_id
             FROM certificates ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LegacyRow {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    certificate_code: row.get(2)?,
                    references: [
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ],
                    issued_at: row.get(8)?,
                    issued_by: row.get(9)?,
                    revoked_at: row.get(10)?,
                    revoked_reason: row.get(11)?,
                    revoked_by_id: row.get(12)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let now = Utc::now();
    let mut flagged = 0usize;

    for row in &legacy {
        row.check_revocation()?;
        let columns = row.owner_columns()?;
        let outcome = resolve_legacy_owner(&columns).map_err(|e| {
            StoreError::Migration(format!("certificate {}: {}", row.id, e))
        })?;

        if let BackfillOutcome::Ambiguous { owner, populated } = &outcome {
            warn!(
                certificate_id = %row.id,
                chosen = %owner.owner_type(),
                populated = ?populated,
                "legacy certificate has several owner references; resolved by priority"
            );
            tx.execute(
                "INSERT INTO owner_backfill_flags (certificate_id, chosen_owner_type, populated, flagged_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    row.id,
                    owner.owner_type().as_str(),
                    serde_json::to_string(populated)?,
                    now,
                ],
            )?;
            flagged += 1;
        }

        let owner = outcome.owner();
        let resolved = outcome.columns();
        tx.execute(
            "INSERT INTO certificates_v2 (
                id, event_id, certificate_code, owner_type,
                registration_id, speaker_id, user_id, block_enrollment_id, session_id,
                issued_at, issued_by, version, version_history,
                revoked_at, revoked_reason, revoked_by_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, '[]', ?12, ?13, ?14)",
            params![
                row.id,
                row.event_id,
                row.certificate_code,
                owner.owner_type().as_str(),
                resolved.registration_id.map(|u| u.to_string()),
                resolved.speaker_id.map(|u| u.to_string()),
                resolved.user_id.map(|u| u.to_string()),
                resolved.block_enrollment_id.map(|u| u.to_string()),
                resolved.session_id.map(|u| u.to_string()),
                row.issued_at,
                row.issued_by,
                row.revoked_at,
                row.revoked_reason,
                row.revoked_by_id,
            ],
        )?;
    }

    tx.execute_batch(
        r#"
        DROP TABLE certificates;
        ALTER TABLE certificates_v2 RENAME TO certificates;

        CREATE INDEX idx_certificates_event ON certificates(event_id);
        CREATE INDEX idx_certificates_registration ON certificates(registration_id);
        CREATE INDEX idx_certificates_speaker ON certificates(speaker_id);
        CREATE INDEX idx_certificates_user ON certificates(user_id);
        CREATE INDEX idx_certificates_block_enrollment ON certificates(block_enrollment_id);
        CREATE INDEX idx_certificates_session ON certificates(session_id);
        "#,
    )?;

    info!(
        migrated = legacy.len(),
        flagged, "backfilled owner discriminator"
    );
    Ok(())
}

struct LegacyRow {
    id: String,
    event_id: String,
    certificate_code: String,
    /// registration, speaker, user, block enrollment, session.
    references: [Option<String>; 5],
    issued_at: String,
    issued_by: String,
    revoked_at: Option<String>,
    revoked_reason: Option<String>,
    revoked_by_id: Option<String>,
}

impl LegacyRow {
    /// Revocation columns must be all set or all null.
    fn check_revocation(&self) -> Result<()> {
        let fields = [
            ("revoked_at", self.revoked_at.is_some()),
            ("revoked_reason", self.revoked_reason.is_some()),
            ("revoked_by_id", self.revoked_by_id.is_some()),
        ];
        if fields.iter().all(|(_, set)| *set) || fields.iter().all(|(_, set)| !*set) {
            return Ok(());
        }

        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, set)| !*set)
            .map(|(name, _)| *name)
            .collect();
        Err(StoreError::Migration(format!(
            "certificate {}: partial revocation, missing {}",
            self.id,
            missing.join(", ")
        )))
    }

    fn owner_columns(&self) -> Result<OwnerColumns> {
        let parse = |value: &Option<String>| -> Result<Option<uuid::Uuid>> {
            value
                .as_deref()
                .map(|s| {
                    s.parse().map_err(|_| {
                        StoreError::Migration(format!(
                            "certificate {}: malformed owner reference {:?}",
                            self.id, s
                        ))
                    })
                })
                .transpose()
        };

        let [registration, speaker, user, block_enrollment, session] = &self.references;
        Ok(OwnerColumns {
            registration_id: parse(registration)?,
            speaker_id: parse(speaker)?,
            user_id: parse(user)?,
            block_enrollment_id: parse(block_enrollment)?,
            session_id: parse(session)?,
        })
    }
}
