//! SQLite implementation of the CertificateStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking. The owner invariant, the
//! version/history invariant and revocation completeness are all enforced by
//! CHECK constraints (see [`crate::migration`]), so writes that bypass this
//! type are rejected too.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;
use uuid::Uuid;

use cert_registry_core::{
    ActorId, AuditEntry, Certificate, CertificateId, EventId, LastReissue, Owner, OwnerColumns,
    OwnerType, Revocation, VersionHistoryEntry,
};

use crate::error::{Result, StoreError};
use crate::migration::{self, OWNER_CHECK};
use crate::traits::{BackfillFlag, CertificateStore, Expected, InsertResult, UpdateResult};

const CERTIFICATE_COLUMNS: &str = "id, event_id, certificate_code, owner_type,
    registration_id, speaker_id, user_id, block_enrollment_id, session_id,
    issued_at, issued_by, version, version_history,
    revoked_at, revoked_reason, revoked_by_id, last_reissued_at, last_reissued_by_id";

const AUDIT_COLUMNS: &str = "id, entity_type, entity_id, action, previous_values, new_values,
    actor_id, actor_label, reason, created_at";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Translate constraint failures into store errors that name the rule.
fn map_write_error(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let msg = msg.unwrap_or_else(|| err.to_string());
            if msg.contains(OWNER_CHECK) {
                StoreError::OwnerConstraint(msg)
            } else {
                StoreError::Constraint(msg)
            }
        }
        other => StoreError::Database(other),
    }
}

fn opt_string(value: Option<Uuid>) -> Option<String> {
    value.map(|u| u.to_string())
}

fn parse_uuid<T: From<Uuid>>(column: &str, value: &str) -> Result<T> {
    value
        .parse::<Uuid>()
        .map(T::from)
        .map_err(|_| StoreError::InvalidData(format!("{}: malformed uuid {:?}", column, value)))
}

fn parse_opt_uuid(column: &str, value: Option<&str>) -> Result<Option<Uuid>> {
    value.map(|v| parse_uuid(column, v)).transpose()
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

/// A certificate row as stored, before domain decoding.
struct CertificateRow {
    id: String,
    event_id: String,
    certificate_code: String,
    owner_type: String,
    references: [Option<String>; 5],
    issued_at: DateTime<Utc>,
    issued_by: String,
    version: u32,
    version_history: String,
    revoked_at: Option<DateTime<Utc>>,
    revoked_reason: Option<String>,
    revoked_by_id: Option<String>,
    last_reissued_at: Option<DateTime<Utc>>,
    last_reissued_by_id: Option<String>,
}

impl CertificateRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            event_id: row.get("event_id")?,
            certificate_code: row.get("certificate_code")?,
            owner_type: row.get("owner_type")?,
            references: [
                row.get("registration_id")?,
                row.get("speaker_id")?,
                row.get("user_id")?,
                row.get("block_enrollment_id")?,
                row.get("session_id")?,
            ],
            issued_at: row.get("issued_at")?,
            issued_by: row.get("issued_by")?,
            version: row.get("version")?,
            version_history: row.get("version_history")?,
            revoked_at: row.get("revoked_at")?,
            revoked_reason: row.get("revoked_reason")?,
            revoked_by_id: row.get("revoked_by_id")?,
            last_reissued_at: row.get("last_reissued_at")?,
            last_reissued_by_id: row.get("last_reissued_by_id")?,
        })
    }

    fn into_certificate(self) -> Result<Certificate> {
        let owner_type: OwnerType = self
            .owner_type
            .parse()
            .map_err(|e| StoreError::InvalidData(format!("certificate {}: {}", self.id, e)))?;

        let [registration, speaker, user, block_enrollment, session] = &self.references;
        let columns = OwnerColumns {
            registration_id: parse_opt_uuid("registration_id", registration.as_deref())?,
            speaker_id: parse_opt_uuid("speaker_id", speaker.as_deref())?,
            user_id: parse_opt_uuid("user_id", user.as_deref())?,
            block_enrollment_id: parse_opt_uuid("block_enrollment_id", block_enrollment.as_deref())?,
            session_id: parse_opt_uuid("session_id", session.as_deref())?,
        };
        let owner = Owner::from_columns(owner_type, &columns)
            .map_err(|e| StoreError::InvalidData(format!("certificate {}: {}", self.id, e)))?;

        let version_history: Vec<VersionHistoryEntry> =
            serde_json::from_str(&self.version_history)?;

        let revocation = match (self.revoked_at, self.revoked_reason, self.revoked_by_id) {
            (Some(revoked_at), Some(reason), Some(by)) => Some(Revocation {
                revoked_at,
                reason,
                revoked_by: parse_uuid("revoked_by_id", &by)?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(StoreError::InvalidData(format!(
                    "certificate {}: partial revocation state",
                    self.id
                )))
            }
        };

        let last_reissue = match (self.last_reissued_at, self.last_reissued_by_id) {
            (Some(reissued_at), Some(by)) => Some(LastReissue {
                reissued_at,
                reissued_by: parse_uuid("last_reissued_by_id", &by)?,
            }),
            _ => None,
        };

        Ok(Certificate {
            id: parse_uuid("id", &self.id)?,
            event_id: parse_uuid("event_id", &self.event_id)?,
            owner,
            certificate_code: self.certificate_code,
            issued_at: self.issued_at,
            issued_by: parse_uuid("issued_by", &self.issued_by)?,
            version: self.version,
            version_history,
            revocation,
            last_reissue,
        })
    }
}

struct AuditRow {
    id: String,
    entity_type: String,
    entity_id: String,
    action: String,
    previous_values: Option<String>,
    new_values: String,
    actor_id: String,
    actor_label: Option<String>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl AuditRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            entity_type: row.get("entity_type")?,
            entity_id: row.get("entity_id")?,
            action: row.get("action")?,
            previous_values: row.get("previous_values")?,
            new_values: row.get("new_values")?,
            actor_id: row.get("actor_id")?,
            actor_label: row.get("actor_label")?,
            reason: row.get("reason")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_entry(self) -> Result<AuditEntry> {
        Ok(AuditEntry {
            id: parse_uuid("audit id", &self.id)?,
            entity_type: self.entity_type,
            entity_id: parse_uuid("entity_id", &self.entity_id)?,
            action: self
                .action
                .parse()
                .map_err(|e| StoreError::InvalidData(format!("audit {}: {}", self.id, e)))?,
            previous_values: self
                .previous_values
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            new_values: serde_json::from_str(&self.new_values)?,
            actor_id: parse_uuid::<ActorId>("actor_id", &self.actor_id)?,
            actor_label: self.actor_label,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────────────────────────────────────

fn insert_certificate_row(tx: &Transaction<'_>, cert: &Certificate) -> Result<()> {
    let columns = cert.owner.to_columns();
    let history = serde_json::to_string(&cert.version_history)?;
    let revocation = cert.revocation.as_ref();
    let last = cert.last_reissue.as_ref();

    tx.execute(
        &format!(
            "INSERT INTO certificates ({}) VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            CERTIFICATE_COLUMNS
        ),
        params![
            cert.id.to_string(),
            cert.event_id.to_string(),
            cert.certificate_code,
            cert.owner.owner_type().as_str(),
            opt_string(columns.registration_id),
            opt_string(columns.speaker_id),
            opt_string(columns.user_id),
            opt_string(columns.block_enrollment_id),
            opt_string(columns.session_id),
            cert.issued_at,
            cert.issued_by.to_string(),
            cert.version,
            history,
            revocation.map(|r| r.revoked_at),
            revocation.map(|r| r.reason.clone()),
            revocation.map(|r| r.revoked_by.to_string()),
            last.map(|l| l.reissued_at),
            last.map(|l| l.reissued_by.to_string()),
        ],
    )
    .map_err(map_write_error)?;

    Ok(())
}

/// Conditionally overwrite the mutable columns. Returns rows changed.
fn update_certificate_row(
    tx: &Transaction<'_>,
    expected: Expected,
    cert: &Certificate,
) -> Result<usize> {
    let columns = cert.owner.to_columns();
    let history = serde_json::to_string(&cert.version_history)?;
    let revocation = cert.revocation.as_ref();
    let last = cert.last_reissue.as_ref();

    tx.execute(
        "UPDATE certificates SET
            owner_type = ?2,
            registration_id = ?3, speaker_id = ?4, user_id = ?5,
            block_enrollment_id = ?6, session_id = ?7,
            version = ?8, version_history = ?9,
            revoked_at = ?10, revoked_reason = ?11, revoked_by_id = ?12,
            last_reissued_at = ?13, last_reissued_by_id = ?14
         WHERE id = ?1 AND version = ?15 AND (revoked_at IS NOT NULL) = ?16",
        params![
            cert.id.to_string(),
            cert.owner.owner_type().as_str(),
            opt_string(columns.registration_id),
            opt_string(columns.speaker_id),
            opt_string(columns.user_id),
            opt_string(columns.block_enrollment_id),
            opt_string(columns.session_id),
            cert.version,
            history,
            revocation.map(|r| r.revoked_at),
            revocation.map(|r| r.reason.clone()),
            revocation.map(|r| r.revoked_by.to_string()),
            last.map(|l| l.reissued_at),
            last.map(|l| l.reissued_by.to_string()),
            expected.version,
            expected.revoked,
        ],
    )
    .map_err(map_write_error)
}

fn insert_audit_row(tx: &Transaction<'_>, entry: &AuditEntry) -> Result<()> {
    let previous = entry
        .previous_values
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let new_values = serde_json::to_string(&entry.new_values)?;

    tx.execute(
        &format!(
            "INSERT INTO audit_log ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            AUDIT_COLUMNS
        ),
        params![
            entry.id.to_string(),
            entry.entity_type,
            entry.entity_id.to_string(),
            entry.action.as_str(),
            previous,
            new_values,
            entry.actor_id.to_string(),
            entry.actor_label,
            entry.reason,
            entry.created_at,
        ],
    )
    .map_err(map_write_error)?;

    Ok(())
}

fn query_certificates(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Certificate>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, CertificateRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(CertificateRow::into_certificate).collect()
}

fn query_certificate(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Option<Certificate>> {
    conn.query_row(sql, params, CertificateRow::from_row)
        .optional()?
        .map(CertificateRow::into_certificate)
        .transpose()
}

#[async_trait]
impl CertificateStore for SqliteStore {
    async fn insert_certificate(
        &self,
        cert: &Certificate,
        audit: &AuditEntry,
    ) -> Result<InsertResult> {
        let cert = cert.clone();
        let audit = audit.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM certificates WHERE id = ?1 OR certificate_code = ?2)",
                params![cert.id.to_string(), cert.certificate_code],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(InsertResult::AlreadyExists);
            }

            insert_certificate_row(&tx, &cert)?;
            insert_audit_row(&tx, &audit)?;
            tx.commit()?;

            debug!(certificate_id = %cert.id, owner_type = %cert.owner.owner_type(), "certificate inserted");
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn update_certificate(
        &self,
        expected: Expected,
        cert: &Certificate,
        audit: &AuditEntry,
    ) -> Result<UpdateResult> {
        let cert = cert.clone();
        let audit = audit.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let changed = update_certificate_row(&tx, expected, &cert)?;
            if changed == 0 {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM certificates WHERE id = ?1)",
                    params![cert.id.to_string()],
                    |row| row.get(0),
                )?;
                return Ok(if exists {
                    UpdateResult::Stale
                } else {
                    UpdateResult::Missing
                });
            }

            // Dropping the transaction on error rolls the update back.
            insert_audit_row(&tx, &audit)?;
            tx.commit()?;

            debug!(
                certificate_id = %cert.id,
                version = cert.version,
                action = %audit.action,
                "certificate updated"
            );
            Ok(UpdateResult::Updated)
        })
        .await
    }

    async fn get_certificate(&self, id: &CertificateId) -> Result<Option<Certificate>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            query_certificate(
                conn,
                &format!("SELECT {} FROM certificates WHERE id = ?1", CERTIFICATE_COLUMNS),
                params![id],
            )
        })
        .await
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Certificate>> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            query_certificate(
                conn,
                &format!(
                    "SELECT {} FROM certificates WHERE certificate_code = ?1",
                    CERTIFICATE_COLUMNS
                ),
                params![code],
            )
        })
        .await
    }

    async fn list_by_owner(&self, owner: &Owner) -> Result<Vec<Certificate>> {
        let owner_type = owner.owner_type();
        let reference = owner.reference().to_string();
        self.with_conn(move |conn| {
            // The column name comes from the closed OwnerType enum.
            query_certificates(
                conn,
                &format!(
                    "SELECT {} FROM certificates WHERE owner_type = ?1 AND {} = ?2
                     ORDER BY issued_at, rowid",
                    CERTIFICATE_COLUMNS,
                    owner_type.column()
                ),
                params![owner_type.as_str(), reference],
            )
        })
        .await
    }

    async fn list_by_event(&self, event_id: &EventId) -> Result<Vec<Certificate>> {
        let event_id = event_id.to_string();
        self.with_conn(move |conn| {
            query_certificates(
                conn,
                &format!(
                    "SELECT {} FROM certificates WHERE event_id = ?1 ORDER BY issued_at, rowid",
                    CERTIFICATE_COLUMNS
                ),
                params![event_id],
            )
        })
        .await
    }

    async fn audit_entries(&self, entity_id: &CertificateId) -> Result<Vec<AuditEntry>> {
        let entity_id = entity_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM audit_log WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY seq",
                AUDIT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    params![cert_registry_core::CERTIFICATE_ENTITY, entity_id],
                    AuditRow::from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(AuditRow::into_entry).collect()
        })
        .await
    }

    async fn backfill_flags(&self) -> Result<Vec<BackfillFlag>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT certificate_id, chosen_owner_type, populated, flagged_at
                 FROM owner_backfill_flags ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, DateTime<Utc>>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(id, chosen, populated, flagged_at)| {
                    Ok(BackfillFlag {
                        certificate_id: parse_uuid("certificate_id", &id)?,
                        chosen: chosen.parse().map_err(|e| {
                            StoreError::InvalidData(format!("backfill flag {}: {}", id, e))
                        })?,
                        populated: serde_json::from_str(&populated)?,
                        flagged_at,
                    })
                })
                .collect()
        })
        .await
    }
}
