//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Numbers with money
//! semantics are stored as decimal strings, timestamps as RFC 3339 text,
//! and structured columns (items, terms) as JSON.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::model::{NewProposal, NewRfp, NewVendor, Proposal, Rfp, RfpStatus, Vendor};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    warn!(raw = %s, "Unparsable datetime in store");
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to a libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to an Rfp.
///
/// Column order matches RFP_COLUMNS:
/// 0:id, 1:title, 2:description, 3:budget, 4:deadline, 5:items,
/// 6:selected_vendors, 7:status, 8:created_at
fn row_to_rfp(row: &libsql::Row) -> Result<Rfp, libsql::Error> {
    let budget: Option<String> = row.get(3).ok();
    let deadline: Option<String> = row.get(4).ok();
    let items: String = row.get(5)?;
    let selected: String = row.get(6)?;
    let status: String = row.get(7)?;
    let created: String = row.get(8)?;

    Ok(Rfp {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        budget: budget.and_then(|raw| raw.parse::<Decimal>().ok()),
        deadline: deadline.map(|raw| parse_datetime(&raw)),
        items: serde_json::from_str(&items).unwrap_or_default(),
        selected_vendors: serde_json::from_str(&selected).unwrap_or_default(),
        status: status.parse().unwrap_or_default(),
        created_at: parse_datetime(&created),
    })
}

/// Map a libsql Row to a Vendor.
///
/// Column order matches VENDOR_COLUMNS: 0:id, 1:name, 2:email, 3:contact, 4:notes
fn row_to_vendor(row: &libsql::Row) -> Result<Vendor, libsql::Error> {
    Ok(Vendor {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        contact: row.get(3)?,
        notes: row.get(4)?,
    })
}

/// Map a libsql Row to a Proposal.
///
/// Column order matches PROPOSAL_COLUMNS:
/// 0:id, 1:rfp_id, 2:vendor, 3:raw_text, 4:terms, 5:summary, 6:score, 7:received_at
fn row_to_proposal(row: &libsql::Row) -> Result<Proposal, libsql::Error> {
    let terms: String = row.get(4)?;
    let received: String = row.get(7)?;

    Ok(Proposal {
        id: row.get(0)?,
        rfp_id: row.get(1)?,
        vendor: row.get(2)?,
        raw_text: row.get(3)?,
        terms: serde_json::from_str(&terms).unwrap_or_default(),
        summary: row.get(5)?,
        score: row.get::<i64>(6)?.clamp(0, 100) as u8,
        received_at: parse_datetime(&received),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const RFP_COLUMNS: &str =
    "id, title, description, budget, deadline, items, selected_vendors, status, created_at";

const VENDOR_COLUMNS: &str = "id, name, email, contact, notes";

const PROPOSAL_COLUMNS: &str =
    "id, rfp_id, vendor, raw_text, terms, summary, score, received_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── RFPs ────────────────────────────────────────────────────────

    async fn create_rfp(&self, rfp: NewRfp) -> Result<Rfp, DatabaseError> {
        let conn = self.conn();

        let items = serde_json::to_string(&rfp.items)
            .map_err(|e| DatabaseError::Serialization(format!("rfp items: {e}")))?;

        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO rfps (title, description, budget, deadline, items)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     RETURNING {RFP_COLUMNS}"
                ),
                params![
                    rfp.title,
                    rfp.description,
                    opt_text_owned(rfp.budget.map(|b| b.to_string())),
                    opt_text_owned(rfp.deadline.map(|d| d.to_rfc3339())),
                    items,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_rfp: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let rfp = row_to_rfp(&row)
                    .map_err(|e| DatabaseError::Query(format!("create_rfp row parse: {e}")))?;
                debug!(rfp_id = rfp.id, title = %rfp.title, "RFP created");
                Ok(rfp)
            }
            Ok(None) => Err(DatabaseError::Query("create_rfp: no row returned".into())),
            Err(e) => Err(DatabaseError::Query(format!("create_rfp: {e}"))),
        }
    }

    async fn get_rfp(&self, id: i64) -> Result<Option<Rfp>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {RFP_COLUMNS} FROM rfps WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_rfp: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let rfp = row_to_rfp(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_rfp row parse: {e}")))?;
                Ok(Some(rfp))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_rfp: {e}"))),
        }
    }

    async fn list_rfps(&self) -> Result<Vec<Rfp>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {RFP_COLUMNS} FROM rfps ORDER BY id DESC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_rfps: {e}")))?;

        let mut rfps = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_rfp(&row) {
                Ok(rfp) => rfps.push(rfp),
                Err(e) => warn!("Skipping rfp row: {e}"),
            }
        }
        Ok(rfps)
    }

    async fn set_rfp_vendors(&self, id: i64, vendor_ids: &[i64]) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let selected = serde_json::to_string(vendor_ids)
            .map_err(|e| DatabaseError::Serialization(format!("selected vendors: {e}")))?;

        let changed = conn
            .execute(
                "UPDATE rfps SET selected_vendors = ?1 WHERE id = ?2",
                params![selected, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_rfp_vendors: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "rfp".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_rfp_status(&self, id: i64, status: RfpStatus) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE rfps SET status = ?1 WHERE id = ?2",
                params![status.to_string(), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_rfp_status: {e}")))?;

        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "rfp".into(),
                id: id.to_string(),
            });
        }
        debug!(rfp_id = id, status = %status, "RFP status updated");
        Ok(())
    }

    // ── Vendors ─────────────────────────────────────────────────────

    async fn create_vendor(&self, vendor: NewVendor) -> Result<Vendor, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO vendors (name, email, contact, notes)
                     VALUES (?1, ?2, ?3, ?4)
                     RETURNING {VENDOR_COLUMNS}"
                ),
                params![vendor.name, vendor.email.clone(), vendor.contact, vendor.notes],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE") {
                    DatabaseError::Constraint(format!(
                        "vendor email already registered: {}",
                        vendor.email
                    ))
                } else {
                    DatabaseError::Query(format!("create_vendor: {msg}"))
                }
            })?;

        match rows.next().await {
            Ok(Some(row)) => {
                let vendor = row_to_vendor(&row)
                    .map_err(|e| DatabaseError::Query(format!("create_vendor row parse: {e}")))?;
                debug!(vendor_id = vendor.id, email = %vendor.email, "Vendor registered");
                Ok(vendor)
            }
            Ok(None) => Err(DatabaseError::Query("create_vendor: no row returned".into())),
            Err(e) => Err(DatabaseError::Query(format!("create_vendor: {e}"))),
        }
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {VENDOR_COLUMNS} FROM vendors ORDER BY id ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_vendors: {e}")))?;

        let mut vendors = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_vendor(&row) {
                Ok(vendor) => vendors.push(vendor),
                Err(e) => warn!("Skipping vendor row: {e}"),
            }
        }
        Ok(vendors)
    }

    async fn get_vendor(&self, id: i64) -> Result<Option<Vendor>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_vendor: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let vendor = row_to_vendor(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_vendor row parse: {e}")))?;
                Ok(Some(vendor))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_vendor: {e}"))),
        }
    }

    async fn find_vendor_by_email(&self, email: &str) -> Result<Option<Vendor>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {VENDOR_COLUMNS} FROM vendors WHERE email = ?1 COLLATE NOCASE"
                ),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_vendor_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let vendor = row_to_vendor(&row).map_err(|e| {
                    DatabaseError::Query(format!("find_vendor_by_email row parse: {e}"))
                })?;
                Ok(Some(vendor))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_vendor_by_email: {e}"))),
        }
    }

    // ── Proposals ───────────────────────────────────────────────────

    async fn append_proposal(&self, proposal: NewProposal) -> Result<Proposal, DatabaseError> {
        let conn = self.conn();

        let terms = serde_json::to_string(&proposal.terms)
            .map_err(|e| DatabaseError::Serialization(format!("proposal terms: {e}")))?;
        let received_at = Utc::now().to_rfc3339();

        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO proposals (rfp_id, vendor, raw_text, terms, summary, score, received_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     RETURNING {PROPOSAL_COLUMNS}"
                ),
                params![
                    proposal.rfp_id,
                    proposal.vendor,
                    proposal.raw_text,
                    terms,
                    proposal.summary,
                    proposal.score as i64,
                    received_at,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_proposal: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let proposal = row_to_proposal(&row).map_err(|e| {
                    DatabaseError::Query(format!("append_proposal row parse: {e}"))
                })?;
                debug!(
                    proposal_id = proposal.id,
                    rfp_id = proposal.rfp_id,
                    score = proposal.score,
                    "Proposal appended"
                );
                Ok(proposal)
            }
            Ok(None) => Err(DatabaseError::Query("append_proposal: no row returned".into())),
            Err(e) => Err(DatabaseError::Query(format!("append_proposal: {e}"))),
        }
    }

    async fn proposals_for_rfp(&self, rfp_id: i64) -> Result<Vec<Proposal>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE rfp_id = ?1 ORDER BY id ASC"
                ),
                params![rfp_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("proposals_for_rfp: {e}")))?;

        let mut proposals = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_proposal(&row) {
                Ok(proposal) => proposals.push(proposal),
                Err(e) => warn!("Skipping proposal row: {e}"),
            }
        }
        Ok(proposals)
    }

    async fn all_proposals(&self) -> Result<Vec<Proposal>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {PROPOSAL_COLUMNS} FROM proposals ORDER BY id ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("all_proposals: {e}")))?;

        let mut proposals = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_proposal(&row) {
                Ok(proposal) => proposals.push(proposal),
                Err(e) => warn!("Skipping proposal row: {e}"),
            }
        }
        Ok(proposals)
    }

    async fn clear_proposals(&self) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let removed = conn
            .execute("DELETE FROM proposals", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_proposals: {e}")))?;
        debug!(removed, "Proposals cleared");
        Ok(())
    }

    // ── Mailbox checkpoint ──────────────────────────────────────────

    async fn load_checkpoint(&self) -> Result<u32, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                "SELECT last_processed FROM mailbox_checkpoint WHERE id = 1",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_checkpoint: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(0),
            Err(e) => return Err(DatabaseError::Query(format!("load_checkpoint: {e}"))),
        };

        // Unreadable state degrades to 0 and gets repaired by the next
        // save; a broken checkpoint must never stop ingestion.
        match row.get::<i64>(0) {
            Ok(value) => match u32::try_from(value) {
                Ok(id) => Ok(id),
                Err(_) => {
                    warn!(value, "Checkpoint out of range, treating as 0");
                    Ok(0)
                }
            },
            Err(e) => {
                warn!("Unreadable checkpoint, treating as 0: {e}");
                Ok(0)
            }
        }
    }

    async fn save_checkpoint(&self, id: u32) -> Result<(), DatabaseError> {
        let conn = self.conn();
        // MAX keeps the checkpoint monotonic under any interleaving; the
        // CAST folds unreadable legacy values to 0 instead of letting a
        // text comparison pin the row forever.
        conn.execute(
            "INSERT INTO mailbox_checkpoint (id, last_processed) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE
             SET last_processed = MAX(CAST(last_processed AS INTEGER), excluded.last_processed)",
            params![i64::from(id)],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("save_checkpoint: {e}")))?;
        Ok(())
    }
}
