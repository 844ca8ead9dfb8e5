//! Domain types: RFPs, vendors, proposals, and extracted terms.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ── RFPs ────────────────────────────────────────────────────────────

/// A request for proposals, drafted by a buyer and sent to vendors.
///
/// The numeric id is embedded in outgoing mail subjects (`RFP ID: 7`) and is
/// how vendor replies are routed back to the right RFP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rfp {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Target spend; proposals are scored against this when present.
    pub budget: Option<Decimal>,
    pub deadline: Option<DateTime<Utc>>,
    pub items: Vec<RequestedItem>,
    /// Ids of the vendors this RFP has been sent to.
    pub selected_vendors: Vec<i64>,
    pub status: RfpStatus,
    pub created_at: DateTime<Utc>,
}

/// One requested line in an RFP ("20 laptops").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub specs: String,
}

/// Lifecycle status of an RFP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RfpStatus {
    #[default]
    Open,
    Closed,
}

impl std::fmt::Display for RfpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for RfpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown RFP status: {s}")),
        }
    }
}

/// Payload for creating an RFP (id and timestamps assigned by the store).
#[derive(Debug, Clone, Default)]
pub struct NewRfp {
    pub title: String,
    pub description: String,
    pub budget: Option<Decimal>,
    pub deadline: Option<DateTime<Utc>>,
    pub items: Vec<RequestedItem>,
}

// ── Vendors ─────────────────────────────────────────────────────────

/// A registered supplier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub contact: String,
    pub notes: String,
}

/// Payload for registering a vendor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewVendor {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub notes: String,
}

// ── Proposals ───────────────────────────────────────────────────────

/// Commercial terms pulled out of a vendor reply.
///
/// Every field the rules could not find is absent rather than an error;
/// downstream code treats absence as "not detected".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTerms {
    pub total_price: Option<Decimal>,
    /// `$` when the detected total carried a dollar sign.
    #[serde(default)]
    pub currency: Option<String>,
    pub delivery_days: Option<u32>,
    pub warranty: Option<String>,
    pub payment_terms: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

impl ExtractedTerms {
    /// Offer as shown to buyers, e.g. `$39000`. Also part of the duplicate
    /// key, so two missing prices compare equal ("not detected").
    pub fn offer_display(&self) -> String {
        match &self.total_price {
            Some(price) => format!("${price}"),
            None => "not detected".to_string(),
        }
    }

    /// Delivery as shown to buyers, e.g. `30 days`. Also part of the
    /// duplicate key.
    pub fn delivery_display(&self) -> String {
        match self.delivery_days {
            Some(days) => format!("{days} days"),
            None => "not detected".to_string(),
        }
    }
}

/// One priced line in a vendor reply ("20 laptops at $1950").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// A vendor's reply to an RFP, as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: i64,
    pub rfp_id: i64,
    /// Registered vendor id as a string, or the raw sender address when the
    /// sender is not a known vendor.
    pub vendor: String,
    pub raw_text: String,
    pub terms: ExtractedTerms,
    /// Short preview of the reply body.
    pub summary: String,
    pub score: u8,
    pub received_at: DateTime<Utc>,
}

/// Payload for appending a proposal (id and receipt time assigned by the
/// store).
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub rfp_id: i64,
    pub vendor: String,
    pub raw_text: String,
    pub terms: ExtractedTerms,
    pub summary: String,
    pub score: u8,
}
