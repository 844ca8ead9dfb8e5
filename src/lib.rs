//! RFP Desk: request-for-proposal drafting, dispatch, and reply ingestion.

pub mod api;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod model;
pub mod outbound;
pub mod pipeline;
pub mod store;
