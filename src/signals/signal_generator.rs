// =============================================================================
// Signal Generator (§4.5)
// =============================================================================
//
// Combines the indicator bundle, pattern list, regime block, session label,
// symbol config and historical indicator scores into a typed trading signal
// with a calibrated confidence. Persists via an atomic upsert so at most one
// active signal exists per (instrument, timeframe, direction).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::asset_class::{self, AssetClassConfig};
use crate::db::models::BrokerSymbol;
use crate::db::{models::TradingSignal, repo, Db};
use crate::indicators::IndicatorBundle;
use crate::news::{NewsCalendar, NewsImpact};
use crate::patterns::PatternMatch;
use crate::regime::{RegimeState, StrategyType};
use crate::session::session_for;
use crate::signals::ml_contract::{assign_ab_group, MlScorer};
use crate::types::{Bias, DecisionType, Direction, SignalStatus};

const W_PATTERN: f64 = 0.30;
const W_INDICATOR: f64 = 0.40;
const W_STRENGTH: f64 = 0.30;
const MIN_RR: f64 = 1.2;

/// A single indicator's contribution to the aggregation, already weighted by
/// its [`IndicatorScore`](crate::db::models::IndicatorScore).
#[derive(Debug, Clone)]
pub struct SubSignal {
    pub source: String,
    pub direction: Bias,
    pub weight: f64,
    pub strategy_type: StrategyType,
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub buy_signals: usize,
    pub sell_signals: usize,
    /// 0-100 bullishness read from the weighted sub-signals.
    pub indicator_score: f64,
    pub n_indicators: usize,
}

/// Filter sub-signals by regime compatibility, then count directional votes
/// and compute a weighted indicator score (§4.5 Aggregation).
pub fn aggregate(subs: &[SubSignal], regime: &RegimeState) -> Aggregation {
    let filtered: Vec<&SubSignal> = subs
        .iter()
        .filter(|s| regime.regime.allows(s.strategy_type))
        .collect();

    let buy_signals = filtered.iter().filter(|s| s.direction == Bias::Bullish).count();
    let sell_signals = filtered.iter().filter(|s| s.direction == Bias::Bearish).count();

    let total_weight: f64 = filtered.iter().map(|s| s.weight).sum();
    let weighted_sign: f64 = filtered
        .iter()
        .map(|s| {
            let sign = match s.direction {
                Bias::Bullish => 1.0,
                Bias::Bearish => -1.0,
                Bias::Neutral => 0.0,
            };
            s.weight * sign
        })
        .sum();

    let indicator_score = if total_weight > 0.0 {
        50.0 + 50.0 * (weighted_sign / total_weight)
    } else {
        50.0
    };

    Aggregation {
        buy_signals,
        sell_signals,
        indicator_score,
        n_indicators: filtered.len(),
    }
}

/// Decide BUY/SELL/none from the aggregated vote counts. `buy_signal_advantage`
/// is configurable per account (default 2); SELL carries no such asymmetry.
pub fn pick_direction(agg: &Aggregation, buy_signal_advantage: i64) -> Option<Direction> {
    let net_buy = agg.buy_signals as i64 - agg.sell_signals as i64;
    if net_buy >= buy_signal_advantage {
        Some(Direction::Buy)
    } else if agg.sell_signals > agg.buy_signals {
        Some(Direction::Sell)
    } else {
        None
    }
}

fn pattern_score(patterns: &[PatternMatch], direction: Direction) -> f64 {
    let relevant: Vec<&PatternMatch> = patterns
        .iter()
        .filter(|p| match direction {
            Direction::Buy => matches!(p.direction, crate::types::PatternDirection::Bullish),
            Direction::Sell => matches!(p.direction, crate::types::PatternDirection::Bearish),
        })
        .collect();

    if relevant.is_empty() {
        return 50.0;
    }
    relevant.iter().map(|p| p.reliability).sum::<f64>() / relevant.len() as f64
}

/// Rules-based confidence (§4.5 Confidence). `indicator_score` and
/// `strength_score` are both already 0-100. `buy_confidence_penalty` is
/// configurable per account (default 3.0); SELL is never penalized.
pub fn rules_confidence(
    pattern_score: f64,
    indicator_score: f64,
    strength_score: f64,
    n_indicators: usize,
    direction: Direction,
    buy_confidence_penalty: f64,
) -> f64 {
    let confluence_bonus = (n_indicators as f64 * 2.0).min(10.0);
    let indicator_term = (W_INDICATOR * indicator_score + confluence_bonus).min(W_INDICATOR * 100.0);

    let mut score = W_PATTERN * pattern_score + indicator_term + W_STRENGTH * strength_score;

    if direction == Direction::Buy {
        score -= buy_confidence_penalty;
    }

    score.clamp(0.0, 100.0)
}

/// Select final confidence by A/B group (§6 ML contract).
pub fn final_confidence(
    instrument: &str,
    direction: Direction,
    rules_confidence: f64,
    ml_confidence: Option<f64>,
) -> (f64, &'static str) {
    let group = assign_ab_group(instrument, &direction.to_string());
    let confidence = match ml_confidence {
        Some(ml) => group.blend(ml * 100.0, rules_confidence),
        None => rules_confidence,
    };
    (confidence.clamp(0.0, 100.0), group.as_str())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlTp {
    pub sl: f64,
    pub tp: f64,
}

/// Asset-class ATR multipliers, broker stops_level, and a per-symbol max-loss
/// ceiling, capped by an R:R band (§4.5 SL/TP selection). Returns `None` when
/// the resulting R:R falls below [`MIN_RR`] — the signal should be rejected.
pub fn select_sl_tp(
    entry: f64,
    direction: Direction,
    atr: f64,
    class_cfg: &AssetClassConfig,
    broker: &BrokerSymbol,
    max_loss_currency: Option<f64>,
    volume: f64,
) -> Option<SlTp> {
    let atr = if atr > 0.0 { atr } else { entry * class_cfg.fallback_atr_pct / 100.0 };

    let mut sl_distance = atr * class_cfg.atr_sl_multiplier;
    let mut tp_distance = atr * class_cfg.atr_tp_multiplier;

    let min_distance = broker.stops_level * broker.point;
    sl_distance = sl_distance.max(min_distance);
    tp_distance = tp_distance.max(min_distance);

    let min_sl_distance = entry * class_cfg.min_sl_pct / 100.0;
    sl_distance = sl_distance.max(min_sl_distance);

    let max_tp_distance = entry * class_cfg.max_tp_pct / 100.0;
    tp_distance = tp_distance.min(max_tp_distance);

    if let Some(max_loss) = max_loss_currency {
        if broker.tick_value > 0.0 && volume > 0.0 {
            let loss_per_point = broker.tick_value * volume / broker.point.max(1e-9);
            if loss_per_point > 0.0 {
                let max_sl_distance = max_loss / loss_per_point;
                sl_distance = sl_distance.min(max_sl_distance);
            }
        }
    }

    if sl_distance <= 0.0 {
        return None;
    }

    let rr = tp_distance / sl_distance;
    if rr < MIN_RR {
        return None;
    }

    let (sl, tp) = match direction {
        Direction::Buy => (entry - sl_distance, entry + tp_distance),
        Direction::Sell => (entry + sl_distance, entry - tp_distance),
    };

    Some(SlTp { sl, tp })
}

/// Forex is closed Friday 22:00 UTC through Sunday 22:00 UTC; crypto trades
/// around the clock; everything else is assumed to follow broker session
/// info not modeled here, so it defaults to tradeable (§4.5 Market-hours filter).
pub fn is_tradeable(class: crate::types::AssetClass, now: DateTime<Utc>) -> bool {
    use chrono::Datelike;
    use chrono::Timelike;
    use chrono::Weekday;

    if class == crate::types::AssetClass::Crypto {
        return true;
    }
    if class != crate::types::AssetClass::ForexMajor && class != crate::types::AssetClass::ForexMinor {
        return true;
    }

    match now.weekday() {
        Weekday::Fri => now.hour() < 22,
        Weekday::Sat => false,
        Weekday::Sun => now.hour() >= 22,
        _ => true,
    }
}

/// News filter (§4.5): block on a high-impact event for this instrument,
/// returning its name so the caller can expire active signals with reason
/// `news_filter:<event>`.
pub fn news_blocked(calendar: &dyn NewsCalendar, instrument: &str, now: DateTime<Utc>) -> Option<String> {
    calendar
        .upcoming_event(instrument, now)
        .filter(|event| event.impact == NewsImpact::High)
        .map(|event| event.name)
}

const SUB_SIGNAL_MIN_SAMPLES: i64 = 20;

fn oscillator_bias(value: f64, oversold: f64, overbought: f64) -> Option<Bias> {
    if value <= oversold {
        Some(Bias::Bullish)
    } else if value >= overbought {
        Some(Bias::Bearish)
    } else {
        None
    }
}

/// Turn one indicator bundle into regime-taggable sub-signals, weighted by
/// each indicator's historical reliability (§4.5 Aggregation inputs). Trend
/// indicators already carry their own bias; oscillators are read off their
/// standard overbought/oversold bands. Bollinger/VWAP/pivot/fibonacci are
/// price-level tools rather than bias sources and are left out here — they
/// feed SL/TP selection and regime detection instead.
pub async fn build_sub_signals(db: &Db, bundle: &IndicatorBundle) -> anyhow::Result<Vec<SubSignal>> {
    let ema_cross = match (bundle.ema_fast, bundle.ema_slow) {
        (Some(f), Some(s)) if f > s => Some(Bias::Bullish),
        (Some(f), Some(s)) if f < s => Some(Bias::Bearish),
        _ => None,
    };

    let trend: Vec<(&str, Option<Bias>)> = vec![
        ("macd", bundle.macd.as_ref().map(|m| m.bias)),
        ("ema_cross", ema_cross),
        ("ichimoku", bundle.ichimoku.as_ref().map(|i| i.bias)),
        ("parabolic_sar", bundle.parabolic_sar.as_ref().map(|s| s.bias)),
        ("obv", bundle.obv.as_ref().map(|o| o.bias)),
        ("supertrend", bundle.supertrend.as_ref().map(|s| s.bias)),
        ("heiken_ashi", bundle.heiken_ashi.as_ref().map(|h| h.bias)),
    ];

    let mean_reversion: Vec<(&str, Option<Bias>)> = vec![
        ("rsi", bundle.rsi.and_then(|v| oscillator_bias(v, 30.0, 70.0))),
        ("stochastic", bundle.stochastic.as_ref().and_then(|s| oscillator_bias(s.k, 20.0, 80.0))),
        ("cci", bundle.cci.and_then(|v| oscillator_bias(v, -100.0, 100.0))),
        ("williams_r", bundle.williams_r.and_then(|v| oscillator_bias(v, -80.0, -20.0))),
    ];

    let mut subs = Vec::new();
    for (indicators, strategy_type) in [
        (trend, StrategyType::TrendFollowing),
        (mean_reversion, StrategyType::MeanReversion),
    ] {
        for (name, direction) in indicators {
            let Some(direction) = direction else { continue };
            let score = repo::get_indicator_score(db, &bundle.instrument, &bundle.timeframe, name).await?;
            subs.push(SubSignal {
                source: name.to_string(),
                direction,
                weight: score.weight(SUB_SIGNAL_MIN_SAMPLES),
                strategy_type,
            });
        }
    }
    Ok(subs)
}

/// Full pipeline: aggregate -> confidence -> SL/TP -> filters -> persist.
/// Returns `Ok(None)` when no signal should be emitted (no directional
/// advantage, filtered by news/market-hours, or SL/TP rejected on R:R).
#[allow(clippy::too_many_arguments)]
pub async fn generate_signal(
    db: &Db,
    instrument: &str,
    timeframe: &str,
    entry: f64,
    bundle: &IndicatorBundle,
    patterns: &[PatternMatch],
    regime: &RegimeState,
    broker: &BrokerSymbol,
    subs: &[SubSignal],
    buy_signal_advantage: i64,
    buy_confidence_penalty: f64,
    max_loss_currency: Option<f64>,
    volume_hint: f64,
    calendar: &dyn NewsCalendar,
    ml_scorer: Option<&dyn MlScorer>,
    ml_features: Option<&serde_json::Value>,
) -> anyhow::Result<Option<TradingSignal>> {
    let now = Utc::now();
    let class = asset_class::classify(instrument);

    if let Some(event) = news_blocked(calendar, instrument, now) {
        let reason = format!("news_filter:{event}");
        repo::expire_active_signals(db, instrument, &reason).await?;
        repo::insert_decision(db, DecisionType::NewsPause, None, Some(instrument), "NEWS_PAUSE", &reason, None).await?;
        return Ok(None);
    }

    let agg = aggregate(subs, regime);
    let direction = match pick_direction(&agg, buy_signal_advantage) {
        Some(d) => d,
        None => return Ok(None),
    };

    let pscore = pattern_score(patterns, direction);
    let ml_confidence = match ml_scorer {
        Some(scorer) => ml_features.and_then(|f| scorer.score(f)).map(|(c, _)| c),
        None => None,
    };

    let rules = rules_confidence(pscore, agg.indicator_score, regime.strength, agg.n_indicators, direction, buy_confidence_penalty);
    let (confidence, ab_group) = final_confidence(instrument, direction, rules, ml_confidence);

    if entry <= 0.0 {
        return Ok(None);
    }

    let class_cfg = asset_class::default_config(class);
    let atr = bundle.atr.unwrap_or(0.0);
    let sl_tp = match select_sl_tp(entry, direction, atr, &class_cfg, broker, max_loss_currency, volume_hint) {
        Some(v) => v,
        None => return Ok(None),
    };

    let is_valid = is_tradeable(class, now);
    let session = session_for(now);

    let snapshot = json!({
        "indicators": bundle,
        "patterns": patterns.iter().map(|p| json!({
            "name": p.name,
            "direction": p.direction.to_string(),
            "reliability": p.reliability,
        })).collect::<Vec<_>>(),
        "regime": {
            "state": regime.regime.to_string(),
            "strength": regime.strength,
            "direction": regime.direction.to_string(),
        },
        "session": session.to_string(),
        "ml_confidence": ml_confidence,
        "ab_test_group": ab_group,
    });

    let signal = TradingSignal {
        id: Uuid::new_v4().to_string(),
        instrument: instrument.to_string(),
        timeframe: timeframe.to_string(),
        direction,
        confidence,
        entry,
        sl: sl_tp.sl,
        tp: sl_tp.tp,
        status: SignalStatus::Active,
        is_valid,
        snapshot: snapshot.to_string(),
        created_at: now,
        expires_at: now + chrono::Duration::minutes(10),
    };

    repo::upsert_signal(db, &signal).await?;
    Ok(Some(signal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(direction: Bias, weight: f64, strategy: StrategyType) -> SubSignal {
        SubSignal {
            source: "test".to_string(),
            direction,
            weight,
            strategy_type: strategy,
        }
    }

    fn trending_regime() -> RegimeState {
        RegimeState {
            regime: crate::types::Regime::Trending,
            direction: Bias::Bullish,
            strength: 70.0,
            adx: 30.0,
            bbw: 2.0,
            hurst: 0.6,
            entropy: 0.4,
            regime_age_secs: 10.0,
        }
    }

    #[test]
    fn aggregate_filters_by_regime() {
        let subs = vec![
            sub(Bias::Bullish, 0.8, StrategyType::TrendFollowing),
            sub(Bias::Bearish, 0.8, StrategyType::MeanReversion),
        ];
        let agg = aggregate(&subs, &trending_regime());
        assert_eq!(agg.buy_signals, 1);
        assert_eq!(agg.sell_signals, 0);
    }

    #[test]
    fn pick_direction_requires_buy_advantage() {
        let agg = Aggregation {
            buy_signals: 3,
            sell_signals: 2,
            indicator_score: 60.0,
            n_indicators: 3,
        };
        assert_eq!(pick_direction(&agg, 2), None);
        let agg2 = Aggregation { buy_signals: 4, ..agg };
        assert_eq!(pick_direction(&agg2, 2), Some(Direction::Buy));
    }

    #[test]
    fn pick_direction_sell_has_no_advantage_gate() {
        let agg = Aggregation {
            buy_signals: 1,
            sell_signals: 2,
            indicator_score: 40.0,
            n_indicators: 3,
        };
        assert_eq!(pick_direction(&agg, 2), Some(Direction::Sell));
    }

    #[test]
    fn buy_confidence_penalty_applies_only_to_buy() {
        let buy_score = rules_confidence(80.0, 80.0, 80.0, 5, Direction::Buy, 3.0);
        let sell_score = rules_confidence(80.0, 80.0, 80.0, 5, Direction::Sell, 3.0);
        assert!(sell_score - buy_score > 2.9);
    }

    #[test]
    fn select_sl_tp_rejects_below_min_rr() {
        let class_cfg = AssetClassConfig {
            atr_tp_multiplier: 1.0,
            atr_sl_multiplier: 2.0,
            trailing_multiplier: 1.0,
            max_tp_pct: 10.0,
            min_sl_pct: 0.01,
            fallback_atr_pct: 0.3,
        };
        let broker = BrokerSymbol {
            instrument: "EURUSD".into(),
            digits: 5,
            point: 0.00001,
            min_volume: 0.01,
            max_volume: 100.0,
            step_volume: 0.01,
            contract_size: 100000.0,
            tick_size: 0.00001,
            tick_value: 1.0,
            stops_level: 10.0,
            max_spread_pips: 3.0,
        };
        let result = select_sl_tp(1.1000, Direction::Buy, 0.001, &class_cfg, &broker, None, 0.1);
        assert!(result.is_none());
    }

    #[test]
    fn select_sl_tp_accepts_good_rr() {
        let class_cfg = asset_class::default_config(crate::types::AssetClass::ForexMajor);
        let broker = BrokerSymbol {
            instrument: "EURUSD".into(),
            digits: 5,
            point: 0.00001,
            min_volume: 0.01,
            max_volume: 100.0,
            step_volume: 0.01,
            contract_size: 100000.0,
            tick_size: 0.00001,
            tick_value: 1.0,
            stops_level: 10.0,
            max_spread_pips: 3.0,
        };
        let result = select_sl_tp(1.1000, Direction::Buy, 0.0010, &class_cfg, &broker, None, 0.1);
        assert!(result.is_some());
        let sl_tp = result.unwrap();
        assert!(sl_tp.sl < 1.1000);
        assert!(sl_tp.tp > 1.1000);
    }

    #[test]
    fn market_hours_blocks_forex_on_saturday() {
        use chrono::TimeZone;
        let saturday = Utc.with_ymd_and_hms(2026, 1, 3, 12, 0, 0).unwrap();
        assert!(!is_tradeable(crate::types::AssetClass::ForexMajor, saturday));
    }

    #[test]
    fn market_hours_never_blocks_crypto() {
        use chrono::TimeZone;
        let saturday = Utc.with_ymd_and_hms(2026, 1, 3, 12, 0, 0).unwrap();
        assert!(is_tradeable(crate::types::AssetClass::Crypto, saturday));
    }
}
