//! Mailbox access for vendor replies.

pub mod imap;

pub use imap::ImapMailbox;

use async_trait::async_trait;

use crate::error::MailboxError;

/// A message pulled from the reply mailbox.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub uid: u32,
    pub subject: String,
    pub body_text: String,
    pub sender_address: String,
}

/// Read access to the shared reply mailbox.
///
/// Message ids are the mailbox's own ascending ids and survive reconnects,
/// so a persisted checkpoint stays meaningful across restarts.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Ids of messages strictly after `id`, ascending.
    async fn search_after(&self, id: u32) -> Result<Vec<u32>, MailboxError>;

    /// Fetch a single message by id.
    async fn fetch(&self, uid: u32) -> Result<FetchedMessage, MailboxError>;
}
