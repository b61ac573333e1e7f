//! Rollup score formulas. Shares are fractions in [0, 1]; scores are
//! percentages.

use forumpulse_nlp::math::round_to;

/// How divided opinion is: peaks at 100 when positive and negative shares
/// are equal, 0 when there is no signed sentiment at all.
pub fn compute_split(pos_share: f64, neg_share: f64) -> f64 {
    if pos_share == 0.0 && neg_share == 0.0 {
        return 0.0;
    }
    round_to((1.0 - (pos_share - neg_share).abs()) * 100.0, 2)
}

/// (positive consensus, negative consensus): the dominant side's share of
/// all signed sentiment, as a percentage; the non-dominant side reads 0.
/// An exact tie (or no signed sentiment) yields (0, 0).
pub fn compute_consensus(pos_share: f64, neg_share: f64) -> (f64, f64) {
    let signed = pos_share + neg_share;
    if signed == 0.0 || pos_share == neg_share {
        return (0.0, 0.0);
    }
    if pos_share > neg_share {
        (round_to(pos_share / signed * 100.0, 2), 0.0)
    } else {
        (0.0, round_to(neg_share / signed * 100.0, 2))
    }
}

/// Attention intensity scaled by audience breadth.
pub fn compute_heat(total_weighted_intensity: f64, unique_authors: i64) -> f64 {
    round_to(
        total_weighted_intensity * (1.0 + unique_authors as f64).ln(),
        2,
    )
}

/// Relative presence change versus the prior rollup, as a percentage.
/// With no usable baseline: 100 for something-from-nothing, else 0.
pub fn compute_momentum(current: f64, prior: f64) -> f64 {
    if prior == 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    round_to((current - prior) / prior * 100.0, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_peaks_at_even_division() {
        assert_eq!(compute_split(0.5, 0.5), 100.0);
        assert_eq!(compute_split(0.0, 0.0), 0.0);
        assert_eq!(compute_split(0.8, 0.2), 40.0);
        assert_eq!(compute_split(1.0, 0.0), 0.0);
    }

    #[test]
    fn consensus_rewards_the_dominant_side_only() {
        assert_eq!(compute_consensus(0.8, 0.2), (80.0, 0.0));
        assert_eq!(compute_consensus(0.1, 0.3), (0.0, 75.0));
        assert_eq!(compute_consensus(0.0, 0.0), (0.0, 0.0));
        // Exact tie: neither side dominates.
        assert_eq!(compute_consensus(0.4, 0.4), (0.0, 0.0));
    }

    #[test]
    fn momentum_baselines() {
        assert_eq!(compute_momentum(0.3, 0.0), 100.0);
        assert_eq!(compute_momentum(0.0, 0.0), 0.0);
        assert_eq!(compute_momentum(0.0, 0.5), -100.0);
        assert_eq!(compute_momentum(0.6, 0.3), 100.0);
        assert_eq!(compute_momentum(0.15, 0.3), -50.0);
    }

    #[test]
    fn heat_grows_with_authors() {
        assert_eq!(compute_heat(1.0, 0), 0.0);
        let few = compute_heat(2.0, 3);
        let many = compute_heat(2.0, 30);
        assert!(many > few);
        assert_eq!(few, round_to(2.0 * 4.0_f64.ln(), 2));
    }
}
