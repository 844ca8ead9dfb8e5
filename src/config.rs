//! Environment-driven configuration.

use crate::error::ConfigError;

/// Default seconds between mailbox polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 20;

/// Top-level service configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API binds to.
    pub bind_addr: String,
    /// Path of the local database file.
    pub db_path: String,
    /// Seconds between mailbox polls.
    pub poll_interval_secs: u64,
    /// Inbound mailbox settings; `None` disables the ingestion loop.
    pub mailbox: Option<MailboxConfig>,
    /// Outbound SMTP settings; `None` disables sending RFPs by mail.
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr =
            std::env::var("RFP_DESK_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let db_path =
            std::env::var("RFP_DESK_DB_PATH").unwrap_or_else(|_| "./data/rfp-desk.db".to_string());

        let poll_interval_secs = match std::env::var("RFP_DESK_POLL_INTERVAL_SECS") {
            Ok(raw) => parse_poll_interval(&raw)?,
            Err(_) => DEFAULT_POLL_INTERVAL_SECS,
        };

        Ok(Self {
            bind_addr,
            db_path,
            poll_interval_secs,
            mailbox: MailboxConfig::from_env()?,
            smtp: SmtpConfig::from_env(),
        })
    }
}

fn parse_poll_interval(raw: &str) -> Result<u64, ConfigError> {
    let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: "RFP_DESK_POLL_INTERVAL_SECS".to_string(),
        message: format!("expected a positive integer, got {raw:?}"),
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "RFP_DESK_POLL_INTERVAL_SECS".to_string(),
            message: "poll interval must be at least 1 second".to_string(),
        });
    }
    Ok(secs)
}

/// Inbound mailbox (IMAP) configuration.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
}

impl MailboxConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `MAIL_IMAP_HOST` is not set (ingestion disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(host) = std::env::var("MAIL_IMAP_HOST") else {
            return Ok(None);
        };

        let port: u16 = std::env::var("MAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let username = std::env::var("MAIL_USERNAME")
            .map_err(|_| ConfigError::MissingEnvVar("MAIL_USERNAME".to_string()))?;
        let password = std::env::var("MAIL_PASSWORD")
            .map_err(|_| ConfigError::MissingEnvVar("MAIL_PASSWORD".to_string()))?;

        let folder = std::env::var("MAIL_FOLDER").unwrap_or_else(|_| "INBOX".to_string());

        Ok(Some(Self {
            host,
            port,
            username,
            password,
            folder,
        }))
    }
}

/// Outbound SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `MAIL_SMTP_HOST` is not set (outbound disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("MAIL_SMTP_HOST").ok()?;

        let port: u16 = std::env::var("MAIL_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("MAIL_USERNAME").unwrap_or_default();
        let password = std::env::var("MAIL_PASSWORD").unwrap_or_default();
        let from_address =
            std::env::var("MAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_interval_accepts_positive_integers() {
        assert_eq!(parse_poll_interval("20").unwrap(), 20);
        assert_eq!(parse_poll_interval("1").unwrap(), 1);
    }

    #[test]
    fn poll_interval_rejects_zero() {
        assert!(parse_poll_interval("0").is_err());
    }

    #[test]
    fn poll_interval_rejects_garbage() {
        let err = parse_poll_interval("soon").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn mailbox_config_none_when_no_host() {
        // SAFETY: this test runs in isolation; no other thread reads
        // MAIL_IMAP_HOST concurrently.
        unsafe { std::env::remove_var("MAIL_IMAP_HOST") };
        assert!(MailboxConfig::from_env().unwrap().is_none());
    }
}
