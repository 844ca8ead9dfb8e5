//! RFP drafting from free text.
//!
//! Buyers describe what they need in a sentence or two ("We need 20 laptops
//! and 15 monitors. Budget $50,000. Deadline within 45 days."). The same
//! rule-table approach used on vendor replies pulls out a title, budget,
//! deadline, and the requested items.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::{Captures, Regex};
use rust_decimal::Decimal;

use crate::model::{NewRfp, RequestedItem};
use crate::pipeline::extract::{Rule, amount_from_captures, clean_item_name, first_match};

/// Longest title kept from the opening sentence.
const TITLE_MAX_CHARS: usize = 80;

static BUDGET_RULES: LazyLock<Vec<Rule<Decimal>>> = LazyLock::new(|| {
    vec![
        // "total: $50,000", "total $50k"
        Rule {
            pattern: Regex::new(r"(?i)total[:\s]*\$?\s*([\d][\d,.]*)([km])?").unwrap(),
            normalize: amount_from_captures,
        },
        // "budget $50,000", "budget: 80k"
        Rule {
            pattern: Regex::new(r"(?i)budget[:\s]*\$?\s*([\d][\d,.]*)([km])?").unwrap(),
            normalize: amount_from_captures,
        },
        // first dollar amount anywhere
        Rule {
            pattern: Regex::new(r"(?i)\$\s*([\d][\d,.]*)([km])?").unwrap(),
            normalize: amount_from_captures,
        },
    ]
});

static DEADLINE_RULES: LazyLock<Vec<Rule<DateTime<Utc>>>> = LazyLock::new(|| {
    vec![
        // "within 45 days", "in 30 days", relative to now
        Rule {
            pattern: Regex::new(r"(?i)\b(?:within|in)\s+(\d{1,3})\s+days?\b").unwrap(),
            normalize: days_from_now,
        },
        // "2026-09-30"
        Rule {
            pattern: Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap(),
            normalize: iso_date,
        },
        // "30/09/2026" (day first)
        Rule {
            pattern: Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap(),
            normalize: slash_date,
        },
        // "by September 30, 2026", "by Sep 30 2026"
        Rule {
            pattern: Regex::new(
                r"(?i)\bby\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s*(\d{4})",
            )
            .unwrap(),
            normalize: month_name_date,
        },
    ]
});

// Quantity-then-name runs, closed by punctuation or a connective. The
// terminator is part of the match so names stay short ("20 laptops and 15
// monitors" yields two items, not one).
static DRAFT_ITEM_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,4})\s+([A-Za-z][A-Za-z \-]{1,40}?)\s*(?:,|\.|;|:|\band\b|\bwith\b|\bfor\b|\bin\b|\n|$)")
        .unwrap()
});

// ── Date normalizers ────────────────────────────────────────────────

fn days_from_now(caps: &Captures) -> Option<DateTime<Utc>> {
    let days: i64 = caps.get(1)?.as_str().parse().ok()?;
    Some(Utc::now() + Duration::days(days))
}

fn iso_date(caps: &Captures) -> Option<DateTime<Utc>> {
    date_from_parts(caps.get(1)?.as_str(), caps.get(2)?.as_str(), caps.get(3)?.as_str())
}

fn slash_date(caps: &Captures) -> Option<DateTime<Utc>> {
    date_from_parts(caps.get(3)?.as_str(), caps.get(2)?.as_str(), caps.get(1)?.as_str())
}

fn month_name_date(caps: &Captures) -> Option<DateTime<Utc>> {
    let month = match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        _ => 12,
    };
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    midnight(year, month, day)
}

fn date_from_parts(year: &str, month: &str, day: &str) -> Option<DateTime<Utc>> {
    midnight(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn midnight(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    Some(NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?.and_utc())
}

// ── Drafting ────────────────────────────────────────────────────────

/// Draft an RFP from a free-text request.
///
/// The full text becomes the description; title, budget, deadline, and
/// items are best-effort and may individually come back empty.
pub fn draft_rfp(text: &str) -> NewRfp {
    NewRfp {
        title: draft_title(text),
        description: text.trim().to_string(),
        budget: first_match(&BUDGET_RULES, text),
        deadline: first_match(&DEADLINE_RULES, text),
        items: draft_items(text),
    }
}

/// First sentence, capped at 80 characters.
fn draft_title(text: &str) -> String {
    let first = text.split(['.', '\n']).next().unwrap_or("").trim();
    let title: String = first.chars().take(TITLE_MAX_CHARS).collect();
    if title.is_empty() {
        "Untitled RFP".to_string()
    } else {
        title
    }
}

fn draft_items(text: &str) -> Vec<RequestedItem> {
    let mut items: Vec<RequestedItem> = Vec::new();
    for caps in DRAFT_ITEM_RULE.captures_iter(text) {
        let Some(quantity) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };
        let Some(name) = caps.get(2).map(|m| m.as_str()).and_then(clean_item_name) else {
            continue;
        };
        match items.iter_mut().find(|i| i.name.eq_ignore_ascii_case(&name)) {
            Some(existing) => existing.quantity += quantity,
            None => items.push(RequestedItem {
                name,
                quantity,
                specs: String::new(),
            }),
        }
    }
    items
}
