//! Unified `Database` trait: one async interface for all persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::model::{NewProposal, NewRfp, NewVendor, Proposal, Rfp, RfpStatus, Vendor};

/// Backend-agnostic storage covering RFPs, vendors, proposals, and the
/// mailbox checkpoint.
///
/// Proposals are append-only; reads hand back snapshots. The checkpoint is
/// monotonic: saves with a smaller id than the stored one are ignored.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── RFPs ────────────────────────────────────────────────────────

    /// Create an RFP and return it with its assigned id.
    async fn create_rfp(&self, rfp: NewRfp) -> Result<Rfp, DatabaseError>;

    /// Get an RFP by id.
    async fn get_rfp(&self, id: i64) -> Result<Option<Rfp>, DatabaseError>;

    /// All RFPs, newest first.
    async fn list_rfps(&self) -> Result<Vec<Rfp>, DatabaseError>;

    /// Record which vendors an RFP was dispatched to.
    async fn set_rfp_vendors(&self, id: i64, vendor_ids: &[i64]) -> Result<(), DatabaseError>;

    /// Move an RFP through its lifecycle.
    async fn set_rfp_status(&self, id: i64, status: RfpStatus) -> Result<(), DatabaseError>;

    // ── Vendors ─────────────────────────────────────────────────────

    /// Register a vendor. Emails are unique.
    async fn create_vendor(&self, vendor: NewVendor) -> Result<Vendor, DatabaseError>;

    /// All vendors in registration order.
    async fn list_vendors(&self) -> Result<Vec<Vendor>, DatabaseError>;

    /// Get a vendor by id.
    async fn get_vendor(&self, id: i64) -> Result<Option<Vendor>, DatabaseError>;

    /// Look a vendor up by the address a reply came from.
    async fn find_vendor_by_email(&self, email: &str) -> Result<Option<Vendor>, DatabaseError>;

    // ── Proposals ───────────────────────────────────────────────────

    /// Append a proposal; the store assigns id and receipt time.
    async fn append_proposal(&self, proposal: NewProposal) -> Result<Proposal, DatabaseError>;

    /// Proposals for one RFP in receipt order.
    async fn proposals_for_rfp(&self, rfp_id: i64) -> Result<Vec<Proposal>, DatabaseError>;

    /// Every stored proposal in receipt order.
    async fn all_proposals(&self) -> Result<Vec<Proposal>, DatabaseError>;

    /// Drop all proposals. Meant for demo resets.
    async fn clear_proposals(&self) -> Result<(), DatabaseError>;

    // ── Mailbox checkpoint ──────────────────────────────────────────

    /// Last processed mailbox id. 0 when nothing was processed yet or the
    /// stored state is unreadable.
    async fn load_checkpoint(&self) -> Result<u32, DatabaseError>;

    /// Durably advance the checkpoint. A save below the stored value is a
    /// no-op; the checkpoint never moves backward.
    async fn save_checkpoint(&self, id: u32) -> Result<(), DatabaseError>;
}
