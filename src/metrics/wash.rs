use crate::metrics::TradeFill;
use crate::types::WashTradeSuspect;
use alloy::primitives::Address;
use std::collections::{HashMap, HashSet};

/// Thresholds for the wash-trading screen. The defaults flag unusually
/// high-frequency low-variance trading, or unusually dense volume, inside a
/// trailing 24h window.
#[derive(Debug, Clone)]
pub struct WashConfig {
    pub window_secs: u64,
    /// Strict lower bound: a wallet needs more than this many trades.
    pub min_trade_count: u64,
    pub max_trades_per_minute: f64,
    /// Relative size dispersion below this marks the low-variance branch.
    pub size_cv_threshold: f64,
    pub volume_density_usd_per_minute: f64,
    /// Counter-trade matching window, seconds either side.
    pub match_window_secs: u64,
    /// Absolute size tolerance for a matched counter-trade, in base units.
    pub size_tolerance: f64,
    /// Strict lower bound on matched counter-trades per counterparty.
    pub min_counter_matches: u64,
    pub confidence_per_counterparty: u32,
}

impl Default for WashConfig {
    fn default() -> Self {
        Self {
            window_secs: 24 * 60 * 60,
            min_trade_count: 10,
            max_trades_per_minute: 2.0,
            size_cv_threshold: 0.1,
            volume_density_usd_per_minute: 10_000.0,
            match_window_secs: 60,
            size_tolerance: 0.01,
            min_counter_matches: 3,
            confidence_per_counterparty: 20,
        }
    }
}

struct WalletActivity<'a> {
    trades: Vec<&'a TradeFill>,
    total_volume_usd: f64,
    active_minutes: u64,
    avg_size: f64,
    stddev_size: f64,
}

fn wallet_activity<'a>(trades: Vec<&'a TradeFill>) -> WalletActivity<'a> {
    let n = trades.len() as f64;
    let total_volume_usd: f64 = trades.iter().map(|t| t.value_usd).sum();
    let minutes: HashSet<u64> = trades.iter().map(|t| t.timestamp / 60).collect();
    let avg_size = trades.iter().map(|t| t.base_amount).sum::<f64>() / n;
    let variance = trades
        .iter()
        .map(|t| (t.base_amount - avg_size).powi(2))
        .sum::<f64>()
        / n;

    WalletActivity {
        trades,
        total_volume_usd,
        active_minutes: minutes.len().max(1) as u64,
        avg_size,
        stddev_size: variance.sqrt(),
    }
}

fn is_candidate(activity: &WalletActivity<'_>, config: &WashConfig) -> bool {
    let trade_count = activity.trades.len() as u64;
    if trade_count <= config.min_trade_count {
        return false;
    }
    let minutes = activity.active_minutes as f64;
    let frequency = trade_count as f64 / minutes;
    let low_variance = frequency > config.max_trades_per_minute
        && activity.stddev_size < config.size_cv_threshold * activity.avg_size;
    let dense_volume = activity.total_volume_usd / minutes > config.volume_density_usd_per_minute;
    low_variance || dense_volume
}

/// Screen a window of fills for self-dealing patterns. Candidates pass the
/// frequency/variance/volume gates; counterparties are confirmed by finding
/// opposite-direction trades matched in time and size. A candidate with no
/// confirmed counterparty is still reported at confidence zero so the screen
/// stays observable.
pub fn detect_wash_trades(trades: &[TradeFill], config: &WashConfig) -> Vec<WashTradeSuspect> {
    let mut by_wallet: HashMap<Address, Vec<&TradeFill>> = HashMap::new();
    for trade in trades {
        by_wallet.entry(trade.wallet).or_default().push(trade);
    }

    let mut suspects = Vec::new();
    for (wallet, wallet_trades) in &by_wallet {
        let activity = wallet_activity(wallet_trades.clone());
        if !is_candidate(&activity, config) {
            continue;
        }

        let mut related_wallets = HashSet::new();
        let mut suspicious_tx_count = 0u64;
        let mut circular_volume_usd = 0.0;

        for (other, other_trades) in &by_wallet {
            if other == wallet {
                continue;
            }
            let mut matches = 0u64;
            let mut matched_volume = 0.0;
            for own in &activity.trades {
                for counter in other_trades {
                    let within_window =
                        own.timestamp.abs_diff(counter.timestamp) <= config.match_window_secs;
                    let opposite = own.is_buy != counter.is_buy;
                    let size_matched =
                        (own.base_amount - counter.base_amount).abs() <= config.size_tolerance;
                    if within_window && opposite && size_matched {
                        matches += 1;
                        matched_volume += own.value_usd;
                    }
                }
            }
            if matches > config.min_counter_matches {
                related_wallets.insert(*other);
                suspicious_tx_count += matches;
                circular_volume_usd += matched_volume;
            }
        }

        let confidence_score = (related_wallets.len() as u32 * config.confidence_per_counterparty)
            .min(100);

        suspects.push(WashTradeSuspect {
            wallet: *wallet,
            related_wallets,
            suspicious_tx_count,
            circular_volume_usd,
            confidence_score,
        });
    }

    suspects
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn wallet_a() -> Address {
        address!("00000000000000000000000000000000000000aa")
    }

    fn wallet_b() -> Address {
        address!("00000000000000000000000000000000000000bb")
    }

    fn fill(wallet: Address, is_buy: bool, size: f64, value: f64, ts: u64) -> TradeFill {
        TradeFill {
            wallet,
            is_buy,
            base_amount: size,
            quote_amount: value,
            value_usd: value,
            timestamp: ts,
        }
    }

    /// `count` identically-sized trades packed ten seconds apart, well above
    /// the frequency gate and with zero size variance.
    fn burst(wallet: Address, count: u64, start: u64) -> Vec<TradeFill> {
        (0..count)
            .map(|i| fill(wallet, i % 2 == 0, 100.0, 1_000.0, start + i * 10))
            .collect()
    }

    #[test]
    fn exactly_ten_trades_is_not_flagged() {
        let trades = burst(wallet_a(), 10, 1_700_000_000);
        assert!(detect_wash_trades(&trades, &WashConfig::default()).is_empty());
    }

    #[test]
    fn eleven_trades_crosses_the_strict_boundary() {
        let trades = burst(wallet_a(), 11, 1_700_000_000);
        let suspects = detect_wash_trades(&trades, &WashConfig::default());
        assert_eq!(suspects.len(), 1);
        assert_eq!(suspects[0].wallet, wallet_a());
        assert_eq!(suspects[0].confidence_score, 0);
        assert!(suspects[0].related_wallets.is_empty());
    }

    #[test]
    fn varied_sizes_escape_the_low_variance_gate() {
        let trades: Vec<TradeFill> = (0..12)
            .map(|i| {
                fill(
                    wallet_a(),
                    i % 2 == 0,
                    50.0 + 25.0 * i as f64,
                    1_000.0,
                    1_700_000_000 + i * 10,
                )
            })
            .collect();
        assert!(detect_wash_trades(&trades, &WashConfig::default()).is_empty());
    }

    #[test]
    fn dense_volume_flags_even_with_varied_sizes() {
        let trades: Vec<TradeFill> = (0..12)
            .map(|i| {
                fill(
                    wallet_a(),
                    i % 2 == 0,
                    50.0 + 25.0 * i as f64,
                    50_000.0,
                    1_700_000_000 + i * 10,
                )
            })
            .collect();
        let suspects = detect_wash_trades(&trades, &WashConfig::default());
        assert_eq!(suspects.len(), 1);
    }

    #[test]
    fn circular_counterparty_raises_confidence() {
        let start = 1_700_000_000;
        let mut trades = burst(wallet_a(), 12, start);
        // Mirror five of the candidate's trades from another wallet, a few
        // seconds later and in the opposite direction.
        for i in 0..5usize {
            let own = trades[i].clone();
            trades.push(fill(
                wallet_b(),
                !own.is_buy,
                own.base_amount,
                own.value_usd,
                own.timestamp + 5,
            ));
        }

        let suspects = detect_wash_trades(&trades, &WashConfig::default());
        let candidate = suspects.iter().find(|s| s.wallet == wallet_a()).unwrap();
        assert!(candidate.related_wallets.contains(&wallet_b()));
        assert_eq!(candidate.confidence_score, 20);
        assert!(candidate.suspicious_tx_count > 3);
        assert!(candidate.circular_volume_usd > 0.0);
    }

    #[test]
    fn confidence_saturates_at_one_hundred() {
        let start = 1_700_000_000;
        let mut trades = burst(wallet_a(), 12, start);
        for c in 0..6u8 {
            let counter = Address::repeat_byte(0x10 + c);
            for i in 0..5u64 {
                let own = trades[i as usize].clone();
                trades.push(fill(
                    counter,
                    !own.is_buy,
                    own.base_amount,
                    own.value_usd,
                    own.timestamp + 3,
                ));
            }
        }
        let suspects = detect_wash_trades(&trades, &WashConfig::default());
        let candidate = suspects.iter().find(|s| s.wallet == wallet_a()).unwrap();
        assert_eq!(candidate.related_wallets.len(), 6);
        assert_eq!(candidate.confidence_score, 100);
    }
}
