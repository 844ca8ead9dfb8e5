//! Outbound mail: RFP dispatch to vendors over SMTP.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::SmtpConfig;
use crate::error::OutboundError;
use crate::model::{Rfp, Vendor};

/// SMTP mailer for RFP dispatch.
pub struct Mailer {
    config: SmtpConfig,
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Subject line for an RFP dispatch. The bracketed marker is what ties
    /// a vendor's reply back to the RFP, so its form never changes.
    pub fn rfp_subject(rfp: &Rfp) -> String {
        format!("RFP: {} [RFP ID: {}]", rfp.title, rfp.id)
    }

    /// Body for an RFP dispatch, ending with reply instructions the
    /// ingestion pipeline understands.
    pub fn rfp_body(rfp: &Rfp, vendor: &Vendor) -> String {
        let mut body = format!(
            "Hello {},\n\nWe are requesting proposals for: {}\n\n{}\n",
            vendor.name, rfp.title, rfp.description
        );

        if !rfp.items.is_empty() {
            body.push_str("\nRequested items:\n");
            for item in &rfp.items {
                body.push_str(&format!("- {} x {}\n", item.quantity, item.name));
            }
        }

        if let Some(budget) = rfp.budget {
            body.push_str(&format!("\nBudget: ${budget}\n"));
        }
        if let Some(deadline) = rfp.deadline {
            body.push_str(&format!("Deadline: {}\n", deadline.format("%Y-%m-%d")));
        }

        body.push_str(&format!(
            "\nPlease reply to this email keeping the subject line\n\
             \"RFP REPLY [RFP ID: {}]\" and include your total price,\n\
             delivery timeline, warranty, and payment terms.\n",
            rfp.id
        ));

        body
    }

    /// Send one RFP to one vendor. Blocking; run via `spawn_blocking`.
    pub fn send_rfp(&self, rfp: &Rfp, vendor: &Vendor) -> Result<(), OutboundError> {
        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());

        let transport = SmtpTransport::relay(&self.config.host)
            .map_err(|e| OutboundError::Transport(format!("SMTP relay error: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| OutboundError::Compose(format!("Invalid from address: {e}")))?,
            )
            .to(vendor
                .email
                .parse()
                .map_err(|e| OutboundError::Compose(format!("Invalid to address: {e}")))?)
            .subject(Self::rfp_subject(rfp))
            .body(Self::rfp_body(rfp, vendor))
            .map_err(|e| OutboundError::Compose(format!("Failed to build email: {e}")))?;

        transport
            .send(&email)
            .map_err(|e| OutboundError::Transport(format!("SMTP send failed: {e}")))?;

        info!(rfp_id = rfp.id, to = %vendor.email, "RFP dispatched");
        Ok(())
    }
}
