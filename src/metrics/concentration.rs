use crate::types::ConcentrationStats;
use chrono::{DateTime, Utc};

/// Discrete Gini estimator over non-negative balances, clamped to [0, 1].
/// Zero total (or an empty set) is defined as perfectly equal.
pub fn compute_gini(balances: &[f64]) -> f64 {
    let n = balances.len();
    if n == 0 {
        return 0.0;
    }

    let mut sorted = balances.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let total: f64 = sorted.iter().sum();
    if total == 0.0 {
        return 0.0;
    }

    let cumsum: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, balance)| (n - i) as f64 * balance)
        .sum();

    let gini = (n as f64 + 1.0 - 2.0 * cumsum / total) / n as f64;
    gini.clamp(0.0, 1.0)
}

fn top_share_pct(sorted_desc: &[f64], total: f64, top: usize) -> f64 {
    if total == 0.0 {
        return 0.0;
    }
    let held: f64 = sorted_desc.iter().take(top).sum();
    held / total * 100.0
}

/// Stateless summary of one holder-balance snapshot: the share held by the
/// largest 10/25/50/100 holders plus the Gini coefficient.
pub fn concentration_stats(balances: &[f64], computed_at: DateTime<Utc>) -> ConcentrationStats {
    let mut sorted = balances.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let total: f64 = sorted.iter().sum();

    ConcentrationStats {
        top10_pct: top_share_pct(&sorted, total, 10),
        top25_pct: top_share_pct(&sorted, total, 25),
        top50_pct: top_share_pct(&sorted, total, 50),
        top100_pct: top_share_pct(&sorted, total, 100),
        gini_coefficient: compute_gini(balances),
        computed_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gini_degenerate_inputs() {
        assert_eq!(compute_gini(&[]), 0.0);
        assert_eq!(compute_gini(&[100.0]), 0.0);
        assert_eq!(compute_gini(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn gini_perfect_equality() {
        assert!(compute_gini(&[1.0, 1.0, 1.0, 1.0]).abs() < 1e-12);
    }

    #[test]
    fn gini_single_dominant_holder() {
        // n = 4, sorted [0, 0, 0, 100]: cumsum = 1 * 100, total = 100,
        // gini = (5 - 2) / 4.
        let gini = compute_gini(&[0.0, 0.0, 0.0, 100.0]);
        assert!((gini - 0.75).abs() < 1e-9);
    }

    #[test]
    fn gini_is_input_order_independent() {
        let a = compute_gini(&[5.0, 1.0, 3.0, 9.0]);
        let b = compute_gini(&[9.0, 3.0, 5.0, 1.0]);
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn top_shares_count_largest_holders() {
        // 12 holders: two whales and ten minnows.
        let mut balances = vec![400.0, 500.0];
        balances.extend(std::iter::repeat(10.0).take(10));
        let stats = concentration_stats(&balances, Utc::now());

        // Top 10 = whales + eight minnows = 980 of 1000.
        assert!((stats.top10_pct - 98.0).abs() < 1e-9);
        assert!((stats.top25_pct - 100.0).abs() < 1e-9);
        assert!((stats.top100_pct - 100.0).abs() < 1e-9);
        assert!(stats.gini_coefficient > 0.5);
    }

    #[test]
    fn empty_snapshot_is_all_zero() {
        let stats = concentration_stats(&[], Utc::now());
        assert_eq!(stats.top10_pct, 0.0);
        assert_eq!(stats.gini_coefficient, 0.0);
    }
}
