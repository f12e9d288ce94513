//! Signal scoring for [`TechnicalIndicators`] snapshots.
//!
//! Each populated indicator contributes a weighted vote; votes are folded
//! into per-dimension signals (trend, momentum, volume) and an overall
//! signal with a strength in [0, 100]. Weights are heuristic and tunable.

use crate::models::{SignalLevel, TechnicalIndicators};

/// A single weighted vote: (label, weight, bullish).
type Vote = (&'static str, i32, bool);

fn score_votes(votes: &[Vote]) -> (SignalLevel, i32) {
    if votes.is_empty() {
        return (SignalLevel::Hold, 0);
    }
    let total_weight: i32 = votes.iter().map(|(_, w, _)| w).sum();
    let score: i32 = votes
        .iter()
        .map(|(_, weight, bullish)| if *bullish { *weight } else { -*weight })
        .sum();
    // Normalize to [-100, 100] against the weight actually in play.
    let normalized = if total_weight > 0 {
        score * 100 / total_weight
    } else {
        0
    };
    (SignalLevel::from_score(normalized), normalized)
}

fn trend_votes(ind: &TechnicalIndicators) -> Vec<Vote> {
    let mut votes = Vec::new();

    if let (Some(sma_20), Some(sma_50)) = (ind.sma_20, ind.sma_50) {
        votes.push(("sma20 vs sma50", 3, sma_20 > sma_50));
    }
    if let (Some(sma_50), Some(sma_200)) = (ind.sma_50, ind.sma_200) {
        votes.push(("sma50 vs sma200", 2, sma_50 > sma_200));
    }
    if let (Some(ema_12), Some(ema_26)) = (ind.ema_12, ind.ema_26) {
        votes.push(("ema12 vs ema26", 2, ema_12 > ema_26));
    }
    if let (Some(up), Some(down)) = (ind.aroon_up, ind.aroon_down) {
        if (up - down).abs() > 20.0 {
            votes.push(("aroon spread", 2, up > down));
        }
    }
    // ADX only qualifies the trend when it is directional enough to matter.
    if let Some(adx) = ind.adx {
        if adx > 25.0 {
            if let (Some(sma_20), Some(sma_50)) = (ind.sma_20, ind.sma_50) {
                votes.push(("adx confirms", 1, sma_20 > sma_50));
            }
        }
    }
    votes
}

fn momentum_votes(ind: &TechnicalIndicators) -> Vec<Vote> {
    let mut votes = Vec::new();

    if let Some(rsi) = ind.rsi_14 {
        if rsi < 30.0 {
            votes.push(("rsi oversold", 3, true));
        } else if rsi > 70.0 {
            votes.push(("rsi overbought", 3, false));
        } else {
            votes.push(("rsi neutral-lean", 1, rsi >= 50.0));
        }
    }
    if let Some(hist) = ind.macd_histogram {
        votes.push(("macd histogram", 3, hist > 0.0));
    }
    if let (Some(k), Some(d)) = (ind.stoch_k, ind.stoch_d) {
        if k < 20.0 {
            votes.push(("stoch oversold", 2, true));
        } else if k > 80.0 {
            votes.push(("stoch overbought", 2, false));
        } else {
            votes.push(("stoch cross", 1, k > d));
        }
    }
    if let Some(wr) = ind.williams_r {
        if wr < -80.0 {
            votes.push(("williams oversold", 1, true));
        } else if wr > -20.0 {
            votes.push(("williams overbought", 1, false));
        }
    }
    if let Some(cci) = ind.cci {
        if cci < -100.0 {
            votes.push(("cci oversold", 1, true));
        } else if cci > 100.0 {
            votes.push(("cci overbought", 1, false));
        }
    }
    votes
}

fn volume_votes(ind: &TechnicalIndicators) -> Vec<Vote> {
    let mut votes = Vec::new();

    if let Some(obv) = ind.obv {
        votes.push(("obv direction", 2, obv > 0.0));
    }
    if let (Some(vwap), Some(bb_middle)) = (ind.vwap, ind.bb_middle) {
        votes.push(("vwap vs mid-band", 1, vwap > bb_middle));
    }
    if let Some(percent_b) = ind.bb_percent_b {
        if percent_b < 0.05 {
            votes.push(("band squeeze low", 2, true));
        } else if percent_b > 0.95 {
            votes.push(("band squeeze high", 2, false));
        }
    }
    votes
}

/// Recompute every derived signal field in place. Called on every write.
pub fn recompute(ind: &mut TechnicalIndicators) {
    let trend = trend_votes(ind);
    let momentum = momentum_votes(ind);
    let volume = volume_votes(ind);

    let (trend_signal, trend_score) = score_votes(&trend);
    let (momentum_signal, momentum_score) = score_votes(&momentum);
    let (volume_signal, volume_score) = score_votes(&volume);

    ind.trend_signal = trend_signal;
    ind.momentum_signal = momentum_signal;
    ind.volume_signal = volume_signal;

    // Overall: trend weighs heaviest, volume confirms.
    let mut weighted = 0i32;
    let mut weights = 0i32;
    for (score, weight, populated) in [
        (trend_score, 5, !trend.is_empty()),
        (momentum_score, 4, !momentum.is_empty()),
        (volume_score, 2, !volume.is_empty()),
    ] {
        if populated {
            weighted += score * weight;
            weights += weight;
        }
    }
    let overall_score = if weights > 0 { weighted / weights } else { 0 };
    ind.overall_signal = SignalLevel::from_score(overall_score);
    ind.signal_strength = (overall_score.unsigned_abs() as f64).clamp(0.0, 100.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Period;
    use uuid::Uuid;

    fn empty() -> TechnicalIndicators {
        TechnicalIndicators::new(Uuid::new_v4(), "TEST", Period::Daily)
    }

    #[test]
    fn no_data_means_hold_with_zero_strength() {
        let mut ind = empty();
        recompute(&mut ind);
        assert_eq!(ind.overall_signal, SignalLevel::Hold);
        assert_eq!(ind.signal_strength, 0.0);
    }

    #[test]
    fn bullish_snapshot_scores_buy() {
        let mut ind = empty();
        ind.sma_20 = Some(105.0);
        ind.sma_50 = Some(100.0);
        ind.sma_200 = Some(90.0);
        ind.ema_12 = Some(106.0);
        ind.ema_26 = Some(101.0);
        ind.rsi_14 = Some(28.0);
        ind.macd_histogram = Some(0.8);
        ind.obv = Some(1_000_000.0);
        recompute(&mut ind);

        assert!(matches!(
            ind.overall_signal,
            SignalLevel::Buy | SignalLevel::StrongBuy
        ));
        assert!(ind.signal_strength > 0.0);
        assert!(ind.signal_strength <= 100.0);
    }

    #[test]
    fn bearish_snapshot_scores_sell() {
        let mut ind = empty();
        ind.sma_20 = Some(90.0);
        ind.sma_50 = Some(100.0);
        ind.sma_200 = Some(110.0);
        ind.rsi_14 = Some(78.0);
        ind.macd_histogram = Some(-0.5);
        ind.stoch_k = Some(88.0);
        ind.stoch_d = Some(82.0);
        recompute(&mut ind);

        assert!(matches!(
            ind.overall_signal,
            SignalLevel::Sell | SignalLevel::StrongSell
        ));
    }

    #[test]
    fn recompute_is_deterministic() {
        let mut ind = empty();
        ind.rsi_14 = Some(45.0);
        ind.macd_histogram = Some(0.1);
        recompute(&mut ind);
        let first = (ind.overall_signal, ind.signal_strength);
        recompute(&mut ind);
        assert_eq!((ind.overall_signal, ind.signal_strength), first);
    }
}
