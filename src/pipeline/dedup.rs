//! Duplicate reply detection.
//!
//! Vendors re-send quotes and forward their own earlier mails. A reply is a
//! duplicate when the same vendor already has a proposal on the same RFP
//! with the same offer and delivery display strings. The comparison runs on
//! the display strings, so two replies with no detected price also collide.

use crate::model::{ExtractedTerms, Proposal};

/// True when a candidate reply matches an already-stored proposal.
pub fn is_duplicate(
    existing: &[Proposal],
    rfp_id: i64,
    vendor: &str,
    terms: &ExtractedTerms,
) -> bool {
    let offer = terms.offer_display();
    let delivery = terms.delivery_display();
    existing.iter().any(|p| {
        p.rfp_id == rfp_id
            && p.vendor == vendor
            && p.terms.offer_display() == offer
            && p.terms.delivery_display() == delivery
    })
}
