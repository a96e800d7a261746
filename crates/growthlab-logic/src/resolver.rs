//! Round resolution.
//!
//! Pure computation over a complete decision set (one decision per team,
//! missing submissions already filled in as empty). Nothing here touches
//! team or game state; the caller applies the returned results.
//!
//! Per team, per channel with a positive allocation `a`:
//!
//! 1. `efficiency = 1.0`, then multiplied in order by
//!    - the trend factor for round `r`
//!      (decreasing `max(0.5, 1 − (r−1)·0.10)`, increasing `1 + (r−1)·0.15`,
//!      volatile one uniform draw in `[0.7, 1.3)` per channel per resolution),
//!    - the competition multiplier when aggregate spend on the channel across
//!      all teams exceeds the saturation threshold,
//!    - `1 + (r−1)·0.10` for momentum-bonus channels when `r > 1`.
//! 2. `downloads = floor((a / cost_per_thousand) · 1000 · efficiency)`.
//!
//! Allocations naming channels missing from the catalog are skipped, and
//! over-cap amounts are used as submitted.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::channels::{Channel, SpecialEffect, TrendClass};
use crate::config::LabConfig;
use crate::constants::EFFICIENCY_SPEND_UNIT;
use crate::intake::Decision;
use crate::TeamId;

/// Low end of the volatile swing.
pub const VOLATILE_MIN: f64 = 0.7;
/// High end of the volatile swing (exclusive).
pub const VOLATILE_MAX: f64 = 1.3;

/// Outcome for one team in one round. Written once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub team_id: TeamId,
    pub round_number: u32,
    pub downloads_earned: u64,
    /// Downloads per 100,000 spent, two decimals; 0 when nothing was spent.
    pub efficiency_score: f64,
    pub round_spending: u64,
    /// Human-readable modifier explanations, in application order.
    pub events: Vec<String>,
}

/// Trend multiplier for deterministic classes. Volatile and stable return 1.0;
/// the volatile draw is applied separately.
pub fn trend_factor(trend: TrendClass, round_number: u32) -> f64 {
    let elapsed = f64::from(round_number.saturating_sub(1));
    match trend {
        TrendClass::Decreasing => (1.0 - elapsed * 0.10).max(0.5),
        TrendClass::Increasing => 1.0 + elapsed * 0.15,
        TrendClass::Stable | TrendClass::Volatile => 1.0,
    }
}

/// Momentum multiplier; 1.0 in round 1.
pub fn momentum_factor(round_number: u32) -> f64 {
    1.0 + f64::from(round_number.saturating_sub(1)) * 0.10
}

/// Downloads per 100,000 spent, rounded to two decimals.
pub fn efficiency_score(downloads: u64, spend: u64) -> f64 {
    if spend == 0 {
        return 0.0;
    }
    let raw = downloads as f64 / (spend as f64 / EFFICIENCY_SPEND_UNIT);
    (raw * 100.0).round() / 100.0
}

/// Aggregate allocation per channel id across every decision.
pub fn channel_totals(decisions: &[Decision]) -> BTreeMap<&str, u64> {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for d in decisions {
        for (id, amount) in &d.allocations {
            let entry = totals.entry(id.as_str()).or_insert(0);
            *entry = entry.saturating_add(*amount);
        }
    }
    totals
}

/// Draw one swing per volatile channel, in catalog order.
fn draw_volatility<'a>(config: &'a LabConfig, rng: &mut impl Rng) -> BTreeMap<&'a str, f64> {
    config
        .catalog
        .iter()
        .filter(|c| c.trend == TrendClass::Volatile)
        .map(|c| (c.id.as_str(), rng.gen_range(VOLATILE_MIN..VOLATILE_MAX)))
        .collect()
}

/// Resolve a complete decision set for `round_number` (1-based).
///
/// Returns one result per decision, in input order.
pub fn resolve_round(
    decisions: &[Decision],
    round_number: u32,
    config: &LabConfig,
    rng: &mut impl Rng,
) -> Vec<RoundResult> {
    let totals = channel_totals(decisions);
    let swings = draw_volatility(config, rng);

    decisions
        .iter()
        .map(|decision| {
            let result = resolve_team(decision, round_number, config, &totals, &swings);
            log::debug!(
                "round {} team {}: {} downloads for {} spent",
                round_number,
                result.team_id,
                result.downloads_earned,
                result.round_spending
            );
            result
        })
        .collect()
}

fn resolve_team(
    decision: &Decision,
    round_number: u32,
    config: &LabConfig,
    totals: &BTreeMap<&str, u64>,
    swings: &BTreeMap<&str, f64>,
) -> RoundResult {
    let mut downloads: u64 = 0;
    let mut spend: u64 = 0;
    let mut events = Vec::new();

    for (id, &amount) in &decision.allocations {
        if amount == 0 {
            continue;
        }
        let Some(channel) = config.catalog.get(id) else {
            continue;
        };
        let aggregate = totals.get(id.as_str()).copied().unwrap_or(0);
        let swing = swings.get(id.as_str()).copied();
        let efficiency =
            channel_efficiency(channel, round_number, aggregate, swing, config, &mut events);

        let raw = amount as f64 / channel.cost_per_thousand as f64 * 1000.0;
        downloads = downloads.saturating_add((raw * efficiency).floor() as u64);
        spend = spend.saturating_add(amount);
    }

    RoundResult {
        team_id: decision.team_id,
        round_number,
        downloads_earned: downloads,
        efficiency_score: efficiency_score(downloads, spend),
        round_spending: spend,
        events,
    }
}

fn channel_efficiency(
    channel: &Channel,
    round_number: u32,
    aggregate_spend: u64,
    swing: Option<f64>,
    config: &LabConfig,
    events: &mut Vec<String>,
) -> f64 {
    let mut efficiency = trend_factor(channel.trend, round_number);

    if channel.trend == TrendClass::Volatile {
        let swing = swing.unwrap_or(1.0);
        efficiency *= swing;
        let pct = ((swing - 1.0) * 100.0).round();
        let direction = if pct >= 0.0 { "up" } else { "down" };
        events.push(format!(
            "{}: market swing {} {}%",
            channel.name,
            direction,
            pct.abs()
        ));
    }

    if aggregate_spend > config.saturation_threshold {
        efficiency *= config.competition_multiplier;
        events.push(format!(
            "{}: competition penalty applied (-{}%)",
            channel.name,
            ((1.0 - config.competition_multiplier) * 100.0).round()
        ));
    }

    if channel.effect == SpecialEffect::MomentumBonus && round_number > 1 {
        let factor = momentum_factor(round_number);
        efficiency *= factor;
        events.push(format!(
            "{}: momentum bonus (+{}%)",
            channel.name,
            ((factor - 1.0) * 100.0).round()
        ));
    }

    efficiency
}
