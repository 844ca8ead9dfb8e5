//! Reply term extraction.
//!
//! Ordered regex rule tables pull commercial terms out of free-form vendor
//! reply text:
//! - an explicit "total" figure beats the first dollar amount
//! - "delivery ... N days" beats a bare "in N days"
//! - priced line items need an `at`/`@` separator, so counts of days or
//!   dollars never turn into items
//!
//! First matching rule wins per field. Anything the rules cannot find is
//! left absent; extraction itself never fails. Equal input yields equal
//! output.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::{ExtractedTerms, LineItem};

/// One extraction rule: a pattern and the normalizer applied to its
/// captures. Tables are scanned in order; the first rule whose pattern
/// matches and whose normalizer accepts the captures wins.
pub(crate) struct Rule<T> {
    pub(crate) pattern: Regex,
    pub(crate) normalize: fn(&Captures) -> Option<T>,
}

pub(crate) fn first_match<T>(rules: &[Rule<T>], text: &str) -> Option<T> {
    rules.iter().find_map(|rule| {
        rule.pattern
            .captures(text)
            .and_then(|caps| (rule.normalize)(&caps))
    })
}

// ── Rule tables ─────────────────────────────────────────────────────

static TOTAL_PRICE_RULES: LazyLock<Vec<Rule<(Decimal, bool)>>> = LazyLock::new(|| {
    vec![
        // "total: $39,000", "total $39k"; binds only through a colon or
        // whitespace, so "total of 20 laptops" is not a price
        Rule {
            pattern: Regex::new(r"(?i)total[:\s]*\$?\s*([\d][\d,.]*)([km])?").unwrap(),
            normalize: priced_amount,
        },
        // first dollar amount anywhere
        Rule {
            pattern: Regex::new(r"(?i)\$\s*([\d][\d,.]*)([km])?").unwrap(),
            normalize: priced_amount,
        },
    ]
});

static DELIVERY_RULES: LazyLock<Vec<Rule<u32>>> = LazyLock::new(|| {
    vec![
        // "delivery within 30 days", "delivered in 7 days"; the lazy gap
        // skips intervening figures ("delivery of the 20 units in 30 days")
        Rule {
            pattern: Regex::new(r"(?i)deliver\w*.*?(\d{1,3})\s*days?").unwrap(),
            normalize: days_from_captures,
        },
        // "in 30 days"
        Rule {
            pattern: Regex::new(r"(?i)\bin\s+(\d+)\s+days?\b").unwrap(),
            normalize: days_from_captures,
        },
    ]
});

static WARRANTY_RULES: LazyLock<Vec<Rule<String>>> = LazyLock::new(|| {
    vec![
        // "2 years warranty", "18 months of warranty"; keep the phrase
        Rule {
            pattern: Regex::new(r"(?i)\d+\s*(?:year|years|month|months)\s*(?:of\s+)?warranty")
                .unwrap(),
            normalize: whole_match,
        },
        // "warranty: lifetime on parts"
        Rule {
            pattern: Regex::new(r"(?i)warranty[:\s]+([^.\n]+)").unwrap(),
            normalize: first_group_trimmed,
        },
    ]
});

static PAYMENT_RULES: LazyLock<Vec<Rule<String>>> = LazyLock::new(|| {
    vec![
        // "Net45", "net 30"
        Rule {
            pattern: Regex::new(r"(?i)\bnet\s*\d{1,3}\b").unwrap(),
            normalize: whole_match,
        },
        // "payment terms: 50% upfront"
        Rule {
            pattern: Regex::new(r"(?i)payment\s+terms?[:\s]+([^.\n]+)").unwrap(),
            normalize: first_group_trimmed,
        },
    ]
});

// Priced lines. Quantity-first ("20 laptops at $1950") and name-first
// ("monitors 15 at $160") forms; the at/@ separator is required.
static ITEM_QTY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+([A-Za-z][A-Za-z0-9 \-]{1,40}?)\s*(?:at|@)\s*\$\s*([\d][\d,.]*)([km])?")
        .unwrap()
});
static ITEM_NAME_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Za-z][A-Za-z0-9 \-]{1,40}?)\s+(\d+)\s*(?:at|@)\s*\$\s*([\d][\d,.]*)([km])?")
        .unwrap()
});

/// Words trimmed off the tail of an item name.
const ITEM_NAME_FILLERS: [&str; 6] = ["each", "per", "of", "with", "item", "items"];

/// A name led by one of these words is never an item; such matches come
/// from counts of time or payment terms that precede a dollar figure.
const ITEM_NAME_BLACKLIST: [&str; 12] = [
    "day", "days", "payment", "delivery", "budget", "net30", "net45", "warranty", "year", "years",
    "month", "months",
];

// ── Normalizers ─────────────────────────────────────────────────────

pub(crate) fn amount_from_captures(caps: &Captures) -> Option<Decimal> {
    parse_amount(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str()))
}

/// Amount plus whether the matched text carried a dollar sign.
fn priced_amount(caps: &Captures) -> Option<(Decimal, bool)> {
    let amount = amount_from_captures(caps)?;
    let dollar = caps.get(0).is_some_and(|m| m.as_str().contains('$'));
    Some((amount, dollar))
}

fn days_from_captures(caps: &Captures) -> Option<u32> {
    caps.get(1)?.as_str().parse().ok()
}

fn whole_match(caps: &Captures) -> Option<String> {
    Some(caps.get(0)?.as_str().trim().to_string())
}

fn first_group_trimmed(caps: &Captures) -> Option<String> {
    let text = caps.get(1)?.as_str().trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Normalize a raw money figure: strip commas, apply k/m multipliers, and
/// round to the nearest whole unit (halves away from zero).
pub(crate) fn parse_amount(raw: &str, suffix: Option<&str>) -> Option<Decimal> {
    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    let digits = digits.trim_end_matches('.');
    let mut value: Decimal = digits.parse().ok()?;
    match suffix.map(str::to_ascii_lowercase).as_deref() {
        Some("k") => value *= Decimal::from(1_000),
        Some("m") => value *= Decimal::from(1_000_000),
        _ => {}
    }
    Some(
        value
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .normalize(),
    )
}

// ── Extraction ──────────────────────────────────────────────────────

/// Pull commercial terms out of reply text.
pub fn extract_terms(text: &str) -> ExtractedTerms {
    let total = first_match(&TOTAL_PRICE_RULES, text);
    ExtractedTerms {
        total_price: total.map(|(amount, _)| amount),
        currency: total.and_then(|(_, dollar)| dollar.then(|| "$".to_string())),
        delivery_days: first_match(&DELIVERY_RULES, text),
        warranty: first_match(&WARRANTY_RULES, text),
        payment_terms: first_match(&PAYMENT_RULES, text),
        line_items: extract_line_items(text),
    }
}

fn extract_line_items(text: &str) -> Vec<LineItem> {
    // Gather (position, item) from both tables, then restore text order.
    let mut found: Vec<(usize, LineItem)> = Vec::new();

    for caps in ITEM_QTY_FIRST.captures_iter(text) {
        if let Some(item) = item_from_parts(&caps, 2, 1, 3, 4) {
            found.push((caps.get(0).map_or(0, |m| m.start()), item));
        }
    }
    for caps in ITEM_NAME_FIRST.captures_iter(text) {
        if let Some(item) = item_from_parts(&caps, 1, 2, 3, 4) {
            found.push((caps.get(0).map_or(0, |m| m.start()), item));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    // Repeats of the same name merge: quantities add up, first price wins.
    let mut items: Vec<LineItem> = Vec::new();
    for (_, item) in found {
        match items
            .iter_mut()
            .find(|existing| existing.name.eq_ignore_ascii_case(&item.name))
        {
            Some(existing) => existing.quantity += item.quantity,
            None => items.push(item),
        }
    }
    items
}

fn item_from_parts(
    caps: &Captures,
    name_idx: usize,
    qty_idx: usize,
    amount_idx: usize,
    suffix_idx: usize,
) -> Option<LineItem> {
    let name = clean_item_name(caps.get(name_idx)?.as_str())?;
    let quantity: u32 = caps.get(qty_idx)?.as_str().parse().ok()?;
    let unit_price = parse_amount(
        caps.get(amount_idx)?.as_str(),
        caps.get(suffix_idx).map(|m| m.as_str()),
    )?;
    Some(LineItem {
        name,
        quantity,
        unit_price,
    })
}

/// Trim filler tails, drop names led by a blacklisted word, and title-case
/// the rest.
pub(crate) fn clean_item_name(raw: &str) -> Option<String> {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    while let Some(last) = words.last() {
        if ITEM_NAME_FILLERS.contains(&last.to_ascii_lowercase().as_str()) {
            words.pop();
        } else {
            break;
        }
    }
    let first = words.first()?;
    if ITEM_NAME_BLACKLIST.contains(&first.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(title_case(&words.join(" ")))
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ───────────────────────────────────────────────────────────
