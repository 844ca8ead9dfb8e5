//! Error types for RFP Desk.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Outbound mail error: {0}")]
    Outbound(#[from] OutboundError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mailbox (inbound mail) errors.
///
/// `Connect` and `Search` are transient: the current poll is abandoned and
/// retried on the next trigger. `Fetch` and `Parse` are per-message: the
/// message is skipped and the checkpoint still advances past it.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Fetch failed for message {uid}: {reason}")]
    Fetch { uid: u32, reason: String },

    #[error("Message {uid} could not be parsed: {reason}")]
    Parse { uid: u32, reason: String },
}

impl MailboxError {
    /// True for failures that should abort the whole poll rather than
    /// skip a single message.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Search(_))
    }
}

/// Outbound (SMTP) mail errors.
#[derive(Debug, thiserror::Error)]
pub enum OutboundError {
    #[error("Outbound mail is not configured")]
    NotConfigured,

    #[error("Failed to build message: {0}")]
    Compose(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
