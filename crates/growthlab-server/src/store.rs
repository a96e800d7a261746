//! Adapters between SpacetimeDB tables and the growthlab-logic contracts.
//!
//! `StdbStore` implements `LabStore` on top of the reducer context, and
//! `StdbEvents` turns published events into `lab_event` rows. Both live only
//! for the duration of one reducer call, so an `Err` from the reducer rolls
//! every write back.

use crate::tables::*;
use growthlab_logic::channels::{self, ChannelCatalog, SpecialEffect, TrendClass};
use growthlab_logic::config::LabConfig;
use growthlab_logic::constants::EVENT_LOG_CAP;
use growthlab_logic::intake::{self, Allocations};
use growthlab_logic::ledger;
use growthlab_logic::lifecycle::{self, GameStatus};
use growthlab_logic::resolver;
use growthlab_logic::store::{LabStore, RoundCommit};
use growthlab_logic::sync::{self, EventSink};
use growthlab_logic::{GameId, LabError, Result, TeamId};
use spacetimedb::{Identity, ReducerContext, Table, Timestamp};

// ============================================================================
// CONVERSIONS
// ============================================================================

pub fn player_id(identity: Identity) -> String {
    identity.to_hex().to_string()
}

fn identity(player: &str) -> Result<Identity> {
    Identity::from_hex(player)
        .map_err(|e| LabError::InternalStore(format!("bad identity {}: {}", player, e)))
}

fn micros(ts: Timestamp) -> i64 {
    ts.to_micros_since_unix_epoch()
}

fn timestamp(micros: i64) -> Timestamp {
    Timestamp::from_micros_since_unix_epoch(micros)
}

fn game_to_logic(row: Game) -> Result<lifecycle::Game> {
    let status = GameStatus::from_u8(row.status).ok_or_else(|| {
        LabError::InternalStore(format!("game {} has bad status {}", row.id, row.status))
    })?;
    Ok(lifecycle::Game {
        id: row.id,
        code: row.code,
        status,
        current_round: row.current_round,
        budget_pool: row.budget_pool,
        round_deadline_micros: row.round_deadline.map(micros),
        creator: player_id(row.creator),
        created_at_micros: micros(row.created_at),
    })
}

fn game_to_row(game: &lifecycle::Game) -> Result<Game> {
    Ok(Game {
        id: game.id,
        code: game.code.clone(),
        status: game.status.as_u8(),
        current_round: game.current_round,
        budget_pool: game.budget_pool,
        round_deadline: game.round_deadline_micros.map(timestamp),
        creator: identity(&game.creator)?,
        created_at: timestamp(game.created_at_micros),
    })
}

fn team_to_logic(row: Team) -> ledger::Team {
    ledger::Team {
        id: row.id,
        game_id: row.game_id,
        name: row.name,
        members: row.members.into_iter().map(player_id).collect(),
        total_spent: row.total_spent,
        total_downloads: row.total_downloads,
    }
}

fn team_to_row(team: &ledger::Team) -> Result<Team> {
    Ok(Team {
        id: team.id,
        game_id: team.game_id,
        name: team.name.clone(),
        members: team
            .members
            .iter()
            .map(|m| identity(m))
            .collect::<Result<Vec<_>>>()?,
        total_spent: team.total_spent,
        total_downloads: team.total_downloads,
    })
}

/// Collapse wire allocations into a map; repeated channels keep the last amount.
pub fn allocations_from_wire(spends: Vec<ChannelSpend>) -> Allocations {
    spends
        .into_iter()
        .map(|s| (s.channel_id, s.amount))
        .collect()
}

fn decision_to_logic(row: Decision) -> intake::Decision {
    intake::Decision {
        game_id: row.game_id,
        team_id: row.team_id,
        round_number: row.round_number,
        allocations: allocations_from_wire(row.allocations),
        submitted_at_micros: micros(row.submitted_at),
    }
}

fn result_to_logic(row: RoundResult) -> resolver::RoundResult {
    resolver::RoundResult {
        team_id: row.team_id,
        round_number: row.round_number,
        downloads_earned: row.downloads_earned,
        efficiency_score: row.efficiency_score,
        round_spending: row.round_spending,
        events: row.events,
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// Assemble the lab configuration from `lab_settings`, `channel` and `lab_admin`.
pub fn load_config(ctx: &ReducerContext) -> Result<LabConfig> {
    let settings = ctx
        .db
        .lab_settings()
        .id()
        .find(0)
        .ok_or_else(|| LabError::InvalidConfig("lab settings not initialized".into()))?;

    let mut rows: Vec<Channel> = ctx.db.channel().iter().collect();
    rows.sort_by_key(|c| c.sort_order);
    let mut list = Vec::with_capacity(rows.len());
    for row in rows {
        let trend = TrendClass::from_u8(row.trend).ok_or_else(|| {
            LabError::InvalidConfig(format!("channel {} has bad trend {}", row.id, row.trend))
        })?;
        let effect = SpecialEffect::from_u8(row.effect).ok_or_else(|| {
            LabError::InvalidConfig(format!("channel {} has bad effect {}", row.id, row.effect))
        })?;
        list.push(channels::Channel {
            id: row.id,
            name: row.name,
            cost_per_thousand: row.cost_per_thousand,
            max_spend: row.max_spend,
            trend,
            effect,
        });
    }

    let mut admins: Vec<String> = ctx
        .db
        .lab_admin()
        .iter()
        .map(|a| player_id(a.identity))
        .collect();
    admins.push(player_id(settings.owner));

    let config = LabConfig {
        catalog: ChannelCatalog::new(list)?,
        total_budget_pool: settings.total_budget_pool,
        max_rounds: settings.max_rounds,
        auto_start_team_count: settings.auto_start_team_count as usize,
        saturation_threshold: settings.saturation_threshold,
        competition_multiplier: settings.competition_multiplier,
        round_duration_secs: settings.round_duration_secs,
        max_team_name_len: settings.max_team_name_len as usize,
        admins,
    };
    config.validate()?;
    Ok(config)
}

fn narrow(value: usize, field: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| LabError::InvalidConfig(format!("{} {} does not fit in u32", field, value)))
}

/// Seed `lab_settings` and `channel` from a configuration.
pub fn seed_config(ctx: &ReducerContext, config: &LabConfig) -> Result<()> {
    config.validate()?;
    let auto_start_team_count = narrow(config.auto_start_team_count, "auto_start_team_count")?;
    let max_team_name_len = narrow(config.max_team_name_len, "max_team_name_len")?;
    ctx.db.lab_settings().insert(LabSettings {
        id: 0,
        total_budget_pool: config.total_budget_pool,
        max_rounds: config.max_rounds,
        auto_start_team_count,
        saturation_threshold: config.saturation_threshold,
        competition_multiplier: config.competition_multiplier,
        round_duration_secs: config.round_duration_secs,
        max_team_name_len,
        owner: ctx.sender,
    });
    for (sort_order, ch) in (0u32..).zip(config.catalog.iter()) {
        ctx.db.channel().insert(Channel {
            id: ch.id.clone(),
            name: ch.name.clone(),
            cost_per_thousand: ch.cost_per_thousand,
            max_spend: ch.max_spend,
            trend: ch.trend.as_u8(),
            effect: ch.effect.as_u8(),
            sort_order,
        });
    }
    Ok(())
}

// ============================================================================
// STORE
// ============================================================================

pub struct StdbStore<'a> {
    ctx: &'a ReducerContext,
}

impl<'a> StdbStore<'a> {
    pub fn new(ctx: &'a ReducerContext) -> Self {
        Self { ctx }
    }
}

impl LabStore for StdbStore<'_> {
    fn insert_game(&mut self, game: lifecycle::Game) -> Result<lifecycle::Game> {
        let row = self.ctx.db.game().insert(game_to_row(&game)?);
        game_to_logic(row)
    }

    fn game(&self, id: GameId) -> Result<Option<lifecycle::Game>> {
        self.ctx.db.game().id().find(id).map(game_to_logic).transpose()
    }

    fn game_by_code(&self, code: &str) -> Result<Option<lifecycle::Game>> {
        self.ctx
            .db
            .game()
            .code()
            .find(code.to_string())
            .map(game_to_logic)
            .transpose()
    }

    fn update_game(&mut self, game: &lifecycle::Game) -> Result<()> {
        if self.ctx.db.game().id().find(game.id).is_none() {
            return Err(LabError::not_found("game", game.id));
        }
        self.ctx.db.game().id().update(game_to_row(game)?);
        Ok(())
    }

    fn insert_team(&mut self, team: ledger::Team) -> Result<ledger::Team> {
        if self.ctx.db.game().id().find(team.game_id).is_none() {
            return Err(LabError::not_found("game", team.game_id));
        }
        let row = self.ctx.db.team().insert(team_to_row(&team)?);
        Ok(team_to_logic(row))
    }

    fn team(&self, id: TeamId) -> Result<Option<ledger::Team>> {
        Ok(self.ctx.db.team().id().find(id).map(team_to_logic))
    }

    fn teams(&self, game_id: GameId) -> Result<Vec<ledger::Team>> {
        let mut teams: Vec<ledger::Team> = self
            .ctx
            .db
            .team()
            .game_id()
            .filter(game_id)
            .map(team_to_logic)
            .collect();
        teams.sort_by_key(|t| t.id);
        Ok(teams)
    }

    fn update_team(&mut self, team: &ledger::Team) -> Result<()> {
        if self.ctx.db.team().id().find(team.id).is_none() {
            return Err(LabError::not_found("team", team.id));
        }
        self.ctx.db.team().id().update(team_to_row(team)?);
        Ok(())
    }

    fn upsert_decision(&mut self, decision: intake::Decision) -> Result<()> {
        let allocations = decision
            .allocations
            .iter()
            .map(|(channel_id, amount)| ChannelSpend {
                channel_id: channel_id.clone(),
                amount: *amount,
            })
            .collect();
        let existing = self
            .ctx
            .db
            .decision()
            .team_id()
            .filter(decision.team_id)
            .find(|d| d.round_number == decision.round_number);
        let row = Decision {
            id: existing.map(|d| d.id).unwrap_or(0),
            game_id: decision.game_id,
            team_id: decision.team_id,
            round_number: decision.round_number,
            allocations,
            submitted_at: timestamp(decision.submitted_at_micros),
        };
        if row.id == 0 {
            self.ctx.db.decision().insert(row);
        } else {
            self.ctx.db.decision().id().update(row);
        }
        Ok(())
    }

    fn decisions(&self, game_id: GameId, round_number: u32) -> Result<Vec<intake::Decision>> {
        let mut decisions: Vec<intake::Decision> = self
            .ctx
            .db
            .decision()
            .game_id()
            .filter(game_id)
            .filter(|d| d.round_number == round_number)
            .map(decision_to_logic)
            .collect();
        decisions.sort_by_key(|d| d.team_id);
        Ok(decisions)
    }

    fn results(&self, game_id: GameId, round_number: u32) -> Result<Vec<resolver::RoundResult>> {
        let mut results: Vec<resolver::RoundResult> = self
            .ctx
            .db
            .round_result()
            .game_id()
            .filter(game_id)
            .filter(|r| r.round_number == round_number)
            .map(result_to_logic)
            .collect();
        results.sort_by_key(|r| r.team_id);
        Ok(results)
    }

    fn commit_round(&mut self, commit: &RoundCommit) -> Result<()> {
        // Validate and convert everything before the first write.
        if !self.results(commit.game_id, commit.round_number)?.is_empty() {
            return Err(LabError::AlreadyResolved {
                round: commit.round_number,
            });
        }
        if self.ctx.db.game().id().find(commit.game_id).is_none() {
            return Err(LabError::not_found("game", commit.game_id));
        }
        let mut team_rows = Vec::with_capacity(commit.teams.len());
        for team in &commit.teams {
            if self.ctx.db.team().id().find(team.id).is_none() {
                return Err(LabError::not_found("team", team.id));
            }
            team_rows.push(team_to_row(team)?);
        }
        let game_row = game_to_row(&commit.game)?;

        for r in &commit.results {
            self.ctx.db.round_result().insert(RoundResult {
                id: 0,
                game_id: commit.game_id,
                team_id: r.team_id,
                round_number: r.round_number,
                downloads_earned: r.downloads_earned,
                efficiency_score: r.efficiency_score,
                round_spending: r.round_spending,
                events: r.events.clone(),
            });
        }
        for row in team_rows {
            self.ctx.db.team().id().update(row);
        }
        self.ctx.db.game().id().update(game_row);
        self.ctx.db.round_resolution().insert(RoundResolution {
            id: 0,
            game_id: commit.game_id,
            round_number: commit.round_number,
            seed: commit.seed,
            total_spend: ledger::total_round_spend(&commit.results),
            pool_before: commit.pool_before,
            pool_after: commit.game.budget_pool,
            resolved_by: self.ctx.sender,
            resolved_at: timestamp(commit.resolved_at_micros),
        });
        Ok(())
    }
}

// ============================================================================
// EVENTS
// ============================================================================

/// Writes each published event as a `lab_event` row.
pub struct StdbEvents<'a> {
    ctx: &'a ReducerContext,
}

impl<'a> StdbEvents<'a> {
    pub fn new(ctx: &'a ReducerContext) -> Self {
        Self { ctx }
    }
}

impl EventSink for StdbEvents<'_> {
    fn publish(&mut self, event: sync::LabEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                log::error!("dropping {} event: {}", event.kind(), e);
                return;
            }
        };
        let game_id = event.game_id();
        let mut stored: Vec<u64> = self
            .ctx
            .db
            .lab_event()
            .game_id()
            .filter(game_id)
            .map(|row| row.id)
            .collect();
        stored.sort_unstable();
        for id in sync::expired_events(&event, &stored, EVENT_LOG_CAP) {
            self.ctx.db.lab_event().id().delete(id);
        }
        self.ctx.db.lab_event().insert(LabEvent {
            id: 0,
            game_id,
            kind: event.kind().to_string(),
            payload,
            created_at: self.ctx.timestamp,
        });
    }
}
