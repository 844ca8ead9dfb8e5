//! Proposal scoring against an RFP budget.
//!
//! The score is a coarse ranking signal, not a statement of value. Price
//! dominates: the further under budget, the better. Delivery speed and the
//! presence of a warranty nudge the result. Everything lands in 0..=100.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::model::{ExtractedTerms, Proposal};

/// Neutral starting point before any adjustment.
const BASE_SCORE: f64 = 50.0;
/// Weight applied to the price-to-budget distance.
const PRICE_WEIGHT: f64 = 30.0;
/// Bonus for delivery within two weeks.
const FAST_DELIVERY_BONUS: f64 = 10.0;
/// Bonus for delivery within a month.
const NORMAL_DELIVERY_BONUS: f64 = 5.0;
/// Penalty for delivery beyond a month.
const SLOW_DELIVERY_PENALTY: f64 = 5.0;
/// Bonus for mentioning any warranty at all.
const WARRANTY_BONUS: f64 = 3.0;

/// Score extracted terms against an optional budget.
///
/// The price adjustment only applies when both the offer total and a
/// positive budget are known; an unknown ratio leaves the base untouched
/// rather than guessing.
pub fn score_terms(terms: &ExtractedTerms, budget: Option<Decimal>) -> u8 {
    let mut score = BASE_SCORE;

    if let (Some(total), Some(budget)) = (terms.total_price, budget)
        && budget > Decimal::ZERO
        && let (Some(total), Some(budget)) = (total.to_f64(), budget.to_f64())
    {
        let ratio = total / budget;
        if ratio <= 1.0 {
            score += ((1.0 - ratio) * PRICE_WEIGHT).round();
        } else {
            score -= ((ratio - 1.0) * PRICE_WEIGHT).round();
        }
    }

    match terms.delivery_days {
        Some(days) if days <= 15 => score += FAST_DELIVERY_BONUS,
        Some(days) if days <= 30 => score += NORMAL_DELIVERY_BONUS,
        Some(_) => score -= SLOW_DELIVERY_PENALTY,
        None => {}
    }

    if terms.warranty.is_some() {
        score += WARRANTY_BONUS;
    }

    score.clamp(0.0, 100.0).round() as u8
}

/// Pick the winning proposal: highest score, earliest receipt on ties.
pub fn best_proposal(proposals: &[Proposal]) -> Option<&Proposal> {
    proposals.iter().reduce(|best, candidate| {
        if candidate.score > best.score
            || (candidate.score == best.score && candidate.received_at < best.received_at)
        {
            candidate
        } else {
            best
        }
    })
}

/// Buyer-facing comparison order: score descending, then receipt order.
pub fn compare_order(a: &Proposal, b: &Proposal) -> std::cmp::Ordering {
    b.score.cmp(&a.score).then(a.received_at.cmp(&b.received_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn terms(
        total: Option<Decimal>,
        delivery: Option<u32>,
        warranty: Option<&str>,
    ) -> ExtractedTerms {
        ExtractedTerms {
            total_price: total,
            delivery_days: delivery,
            warranty: warranty.map(str::to_string),
            ..ExtractedTerms::default()
        }
    }

    fn proposal(score: u8, received_secs: i64) -> Proposal {
        Proposal {
            id: 0,
            rfp_id: 1,
            vendor: "v".into(),
            raw_text: String::new(),
            terms: ExtractedTerms::default(),
            summary: String::new(),
            score,
            received_at: Utc.timestamp_opt(received_secs, 0).unwrap(),
        }
    }

    // ── Scoring tests ───────────────────────────────────────────────

    #[test]
    fn under_budget_fast_delivery_and_warranty() {
        // 50 + round(0.22 * 30) + 5 + 3
        let t = terms(Some(dec!(39000)), Some(30), Some("2 years warranty"));
        assert_eq!(score_terms(&t, Some(dec!(50000))), 65);
    }

    #[test]
    fn delivery_bonus_boundaries() {
        assert_eq!(score_terms(&terms(None, Some(15), None), None), 60);
        assert_eq!(score_terms(&terms(None, Some(16), None), None), 55);
        assert_eq!(score_terms(&terms(None, Some(30), None), None), 55);
        assert_eq!(score_terms(&terms(None, Some(31), None), None), 45);
    }

    #[test]
    fn over_budget_draws_a_penalty() {
        // 50 - round(0.3 * 30)
        let t = terms(Some(dec!(13000)), None, None);
        assert_eq!(score_terms(&t, Some(dec!(10000))), 41);
    }

    #[test]
    fn wildly_over_budget_clamps_to_zero() {
        let t = terms(Some(dec!(100000)), None, None);
        assert_eq!(score_terms(&t, Some(dec!(1000))), 0);
    }

    #[test]
    fn missing_budget_skips_the_price_adjustment() {
        let t = terms(Some(dec!(39000)), None, Some("1 year warranty"));
        assert_eq!(score_terms(&t, None), 53);
    }

    #[test]
    fn zero_budget_is_treated_as_unknown() {
        let t = terms(Some(dec!(39000)), None, None);
        assert_eq!(score_terms(&t, Some(Decimal::ZERO)), 50);
    }

    #[test]
    fn missing_everything_scores_the_base() {
        assert_eq!(score_terms(&ExtractedTerms::default(), Some(dec!(50000))), 50);
    }

    #[test]
    fn exactly_on_budget_gets_no_price_movement() {
        let t = terms(Some(dec!(50000)), None, None);
        assert_eq!(score_terms(&t, Some(dec!(50000))), 50);
    }

    // ── Best-proposal tests ─────────────────────────────────────────

    #[test]
    fn best_picks_the_highest_score() {
        let proposals = vec![proposal(60, 100), proposal(80, 200), proposal(70, 300)];
        assert_eq!(best_proposal(&proposals).unwrap().score, 80);
    }

    #[test]
    fn ties_go_to_the_earliest_reply() {
        let proposals = vec![proposal(70, 500), proposal(70, 100), proposal(70, 300)];
        assert_eq!(
            best_proposal(&proposals).unwrap().received_at,
            Utc.timestamp_opt(100, 0).unwrap()
        );
    }

    #[test]
    fn no_proposals_means_no_best() {
        assert!(best_proposal(&[]).is_none());
    }

    #[test]
    fn compare_order_sorts_score_then_receipt() {
        let mut proposals = vec![proposal(70, 300), proposal(80, 200), proposal(70, 100)];
        proposals.sort_by(compare_order);
        assert_eq!(proposals[0].score, 80);
        assert_eq!(proposals[1].received_at, Utc.timestamp_opt(100, 0).unwrap());
        assert_eq!(proposals[2].received_at, Utc.timestamp_opt(300, 0).unwrap());
    }
}
