//! Mailbox ingestion: the reply pipeline and the loop that drives it.
//!
//! A single worker drains the mailbox in id order, one message at a time.
//! Per message: fetch, subject gate, RFP id lookup, term extraction,
//! duplicate filter, score, append. After each disposition the checkpoint
//! advances to exactly that message id, so a crash never loses a decision
//! and never re-applies one. Skipped messages advance the checkpoint too;
//! only transport-level mailbox failures leave it untouched (those polls
//! abort and retry on the next trigger).

use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use regex::Regex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::mailbox::Mailbox;
use crate::model::{NewProposal, Proposal};
use crate::pipeline::{dedup, extract, score};
use crate::store::Database;

/// Literal a subject must carry to enter the pipeline.
pub const REPLY_SUBJECT_MARKER: &str = "RFP REPLY";

/// Marker that carries the RFP id in subjects and bodies. Case-sensitive:
/// vendors reply to mails we sent, which use exactly this form.
static RFP_ID_RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"RFP ID:\s*(\d+)").unwrap());

/// Characters of the reply body kept as the proposal summary.
const SUMMARY_MAX_CHARS: usize = 120;

/// Outcome of one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stored as a proposal.
    Stored,
    /// The subject gate rejected it.
    NotAReply,
    /// An RFP reply without "RFP ID: <digits>" in subject or body.
    MissingRfpId,
    /// The same vendor already filed the same offer.
    Duplicate,
    /// The mailbox could not produce a usable message for this id.
    FetchFailed,
    /// The store rejected the proposal; the message is skipped, not retried.
    StoreFailed,
}

impl Disposition {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::NotAReply => "not_a_reply",
            Self::MissingRfpId => "missing_rfp_id",
            Self::Duplicate => "duplicate",
            Self::FetchFailed => "fetch_failed",
            Self::StoreFailed => "store_failed",
        }
    }
}

/// Result of one poll pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another poll was already running; this trigger was a no-op.
    Busy,
    /// A transient failure stopped the pass; nothing advanced, the next
    /// trigger retries from the same checkpoint.
    Aborted,
    /// The pass ran to completion, possibly over zero messages.
    Completed { seen: usize, stored: usize },
}

/// What became of a reply body handed to the pipeline.
#[derive(Debug)]
pub enum ReplyOutcome {
    Stored(Proposal),
    Duplicate,
}

/// Single-worker ingestion pipeline over a mailbox and a store.
pub struct Ingestor {
    mailbox: Arc<dyn Mailbox>,
    db: Arc<dyn Database>,
    /// True while a poll pass is running. Timer and push triggers race;
    /// whoever loses the swap backs off instead of double-processing.
    processing: AtomicBool,
}

impl Ingestor {
    pub fn new(mailbox: Arc<dyn Mailbox>, db: Arc<dyn Database>) -> Self {
        Self {
            mailbox,
            db,
            processing: AtomicBool::new(false),
        }
    }

    /// Run one poll pass. Concurrent triggers collapse into `Busy`.
    pub async fn poll(&self) -> PollOutcome {
        if self.processing.swap(true, Ordering::SeqCst) {
            debug!("poll already in progress, ignoring trigger");
            return PollOutcome::Busy;
        }
        let outcome = self.poll_inner().await;
        self.processing.store(false, Ordering::SeqCst);
        outcome
    }

    async fn poll_inner(&self) -> PollOutcome {
        let checkpoint = match self.db.load_checkpoint().await {
            Ok(id) => id,
            Err(e) => {
                warn!("checkpoint unavailable, poll aborted: {e}");
                return PollOutcome::Aborted;
            }
        };

        let ids = match self.mailbox.search_after(checkpoint).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("mailbox search failed, poll aborted: {e}");
                return PollOutcome::Aborted;
            }
        };

        // The mailbox contract is ascending ids above the checkpoint.
        // Enforce both anyway so a sloppy adapter cannot drag the
        // checkpoint backward.
        let mut ids: Vec<u32> = ids.into_iter().filter(|id| *id > checkpoint).collect();
        ids.sort_unstable();

        if ids.is_empty() {
            debug!(checkpoint, "no new mail");
            return PollOutcome::Completed { seen: 0, stored: 0 };
        }

        info!(checkpoint, pending = ids.len(), "processing new messages");

        let mut seen = 0usize;
        let mut stored = 0usize;
        for id in ids {
            let disposition = match self.process_message(id).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(uid = id, "transient mailbox failure, poll aborted: {e}");
                    return PollOutcome::Aborted;
                }
            };
            seen += 1;
            if disposition == Disposition::Stored {
                stored += 1;
            }
            debug!(uid = id, outcome = disposition.label(), "message disposed");

            // Advance only to the id whose disposition was just decided.
            // If the save fails the message is reprocessed next poll and
            // the duplicate filter absorbs the replay.
            if let Err(e) = self.db.save_checkpoint(id).await {
                warn!(uid = id, "checkpoint save failed, poll aborted: {e}");
                return PollOutcome::Aborted;
            }
        }

        PollOutcome::Completed { seen, stored }
    }

    /// Decide one message. `Err` is reserved for transient mailbox
    /// failures; every per-message problem becomes a disposition so the
    /// checkpoint can move past it.
    async fn process_message(&self, uid: u32) -> Result<Disposition, crate::error::MailboxError> {
        let message = match self.mailbox.fetch(uid).await {
            Ok(m) => m,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                warn!(uid, "fetch failed, skipping message: {e}");
                return Ok(Disposition::FetchFailed);
            }
        };

        if !message.subject.contains(REPLY_SUBJECT_MARKER) {
            debug!(uid, subject = %message.subject, "not an RFP reply");
            return Ok(Disposition::NotAReply);
        }

        // Subject first, body as fallback.
        let rfp_id = find_rfp_id(&message.subject).or_else(|| find_rfp_id(&message.body_text));
        let Some(rfp_id) = rfp_id else {
            warn!(uid, subject = %message.subject, "RFP reply without an RFP id, skipping");
            return Ok(Disposition::MissingRfpId);
        };

        // Known senders are recorded under their vendor id; anyone else
        // under the raw address.
        let vendor = match self.db.find_vendor_by_email(&message.sender_address).await {
            Ok(Some(v)) => v.id.to_string(),
            Ok(None) => message.sender_address.clone(),
            Err(e) => {
                warn!(uid, "vendor lookup failed, skipping message: {e}");
                return Ok(Disposition::StoreFailed);
            }
        };

        match ingest_reply(self.db.as_ref(), rfp_id, &vendor, &message.body_text).await {
            Ok(ReplyOutcome::Stored(p)) => {
                info!(uid, rfp_id, vendor = %vendor, score = p.score, "proposal stored");
                Ok(Disposition::Stored)
            }
            Ok(ReplyOutcome::Duplicate) => {
                debug!(uid, rfp_id, vendor = %vendor, "duplicate reply dropped");
                Ok(Disposition::Duplicate)
            }
            Err(e) => {
                warn!(uid, rfp_id, "could not store proposal, skipping message: {e}");
                Ok(Disposition::StoreFailed)
            }
        }
    }
}

/// Run the reply pipeline (extract, dedup, score, append) for one body.
/// Shared by mailbox ingestion and the simulate-reply endpoint.
///
/// An unknown `rfp_id` still takes the proposal; it just scores without a
/// budget. Vendors sometimes reply to RFPs retired from the store.
pub async fn ingest_reply(
    db: &dyn Database,
    rfp_id: i64,
    vendor: &str,
    body: &str,
) -> Result<ReplyOutcome, DatabaseError> {
    let terms = extract::extract_terms(body);

    let existing = db.proposals_for_rfp(rfp_id).await?;
    if dedup::is_duplicate(&existing, rfp_id, vendor, &terms) {
        return Ok(ReplyOutcome::Duplicate);
    }

    let budget = db.get_rfp(rfp_id).await?.and_then(|rfp| rfp.budget);
    let score = score::score_terms(&terms, budget);

    let proposal = db
        .append_proposal(NewProposal {
            rfp_id,
            vendor: vendor.to_string(),
            raw_text: body.to_string(),
            terms,
            summary: summarize(body),
            score,
        })
        .await?;

    Ok(ReplyOutcome::Stored(proposal))
}

/// Find `RFP ID: <digits>` in a piece of text.
pub fn find_rfp_id(text: &str) -> Option<i64> {
    RFP_ID_RULE.captures(text)?.get(1)?.as_str().parse().ok()
}

/// First 120 characters of the body, whitespace-trimmed.
fn summarize(body: &str) -> String {
    body.trim().chars().take(SUMMARY_MAX_CHARS).collect()
}

/// Spawn the ingestion loop. A timer tick or a `wake` notification triggers
/// one poll pass. Returns the task handle and its shutdown flag; an
/// in-flight pass is abandoned at shutdown and resumes from the checkpoint
/// on the next start.
pub fn spawn_ingest_loop(
    ingestor: Arc<Ingestor>,
    poll_interval: Duration,
    wake: Arc<Notify>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Ingestion loop started, polling every {}s",
            poll_interval.as_secs()
        );

        let mut tick = tokio::time::interval(poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = wake.notified() => {}
            }

            if shutdown.load(Ordering::Relaxed) {
                info!("Ingestion loop shutting down");
                return;
            }

            match ingestor.poll().await {
                PollOutcome::Completed { seen, stored } if seen > 0 => {
                    info!(seen, stored, "poll complete");
                }
                PollOutcome::Completed { .. } => {}
                PollOutcome::Busy => debug!("poll trigger ignored, worker busy"),
                PollOutcome::Aborted => {}
            }
        }
    });

    (handle, shutdown_flag)
}
