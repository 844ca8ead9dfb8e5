//! Reply processing pipeline.
//!
//! Every vendor reply flows through the same stages:
//! 1. `extract` pulls structured terms out of the free-text body
//! 2. `dedup` drops re-sent offers
//! 3. `score` ranks the terms against the RFP budget
//! 4. `ingest` drives the stages off the mailbox and owns the checkpoint
//!
//! `draft` sits apart: it turns a buyer's request text into a new RFP with
//! the same rule-table machinery.

pub mod dedup;
pub mod draft;
pub mod extract;
pub mod ingest;
pub mod score;
