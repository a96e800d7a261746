//! The lab's operation surface.
//!
//! A [`LabSession`] borrows the configuration, an access policy, a store and
//! an event sink for the duration of one request. Every operation validates
//! before it writes; round resolution computes its whole [`RoundCommit`]
//! first and hands it to the store in one call.
//!
//! Mutual exclusion of resolutions is the caller's job (one SpacetimeDB
//! reducer at a time, or the lock in [`crate::hub::LabHub`]). As a second
//! line, resolving a round that already has results fails with
//! `AlreadyResolved`, and the store refuses to overwrite results.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::LabConfig;
use crate::constants::{GAME_CODE_ALPHABET, GAME_CODE_LEN};
use crate::error::{LabError, Result};
use crate::intake::{self, Allocations, Decision};
use crate::ledger::{self, Standing, Team};
use crate::lifecycle::{Game, GameStatus, RoundAdvance};
use crate::policy::AccessPolicy;
use crate::resolver::{self, RoundResult};
use crate::store::{LabStore, RoundCommit};
use crate::sync::{EventSink, LabEvent};
use crate::{GameId, TeamId};

/// Attempts at drawing an unused join code before giving up.
const CODE_ATTEMPTS: usize = 32;

/// What a resolution produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round_number: u32,
    pub results: Vec<RoundResult>,
    pub advance: RoundAdvance,
    pub budget_pool: u64,
}

/// Full state of one game, for clients reconciling after missed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game: Game,
    pub teams: Vec<Team>,
    pub standings: Vec<Standing>,
    /// Teams with a decision on file for the current round.
    pub submitted: usize,
}

/// One request's view of the lab.
pub struct LabSession<'a, S: LabStore, E: EventSink> {
    config: &'a LabConfig,
    policy: &'a dyn AccessPolicy,
    store: &'a mut S,
    events: &'a mut E,
}

fn authenticated(caller: Option<&str>) -> Result<&str> {
    caller.ok_or(LabError::Unauthenticated)
}

/// Random join code over the unambiguous alphabet.
pub fn generate_code(rng: &mut impl Rng) -> String {
    (0..GAME_CODE_LEN)
        .map(|_| GAME_CODE_ALPHABET[rng.gen_range(0..GAME_CODE_ALPHABET.len())] as char)
        .collect()
}

impl<'a, S: LabStore, E: EventSink> LabSession<'a, S, E> {
    pub fn new(
        config: &'a LabConfig,
        policy: &'a dyn AccessPolicy,
        store: &'a mut S,
        events: &'a mut E,
    ) -> Self {
        Self {
            config,
            policy,
            store,
            events,
        }
    }

    fn load_game(&self, game_id: GameId) -> Result<Game> {
        self.store
            .game(game_id)?
            .ok_or_else(|| LabError::not_found("game", game_id))
    }

    fn load_team(&self, team_id: TeamId) -> Result<Team> {
        self.store
            .team(team_id)?
            .ok_or_else(|| LabError::not_found("team", team_id))
    }

    fn require_facilitator(&self, game: &Game, caller: &str) -> Result<()> {
        if self.policy.can_facilitate(game, caller) {
            Ok(())
        } else {
            log::warn!("{} is not a facilitator of game {}", caller, game.id);
            Err(LabError::Forbidden(format!(
                "only a facilitator can manage game {}",
                game.id
            )))
        }
    }

    /// New waiting game with a fresh join code and the full budget pool.
    pub fn create_game(
        &mut self,
        caller: Option<&str>,
        now_micros: i64,
        rng: &mut impl Rng,
    ) -> Result<Game> {
        let creator = authenticated(caller)?;
        let mut code = None;
        for _ in 0..CODE_ATTEMPTS {
            let candidate = generate_code(rng);
            if self.store.game_by_code(&candidate)?.is_none() {
                code = Some(candidate);
                break;
            }
        }
        let code = code.ok_or_else(|| {
            LabError::InternalStore("could not allocate an unused game code".into())
        })?;

        let game = self.store.insert_game(Game::new(
            code,
            creator.to_string(),
            self.config,
            now_micros,
        ))?;
        log::info!("game {} created by {} (code {})", game.id, creator, game.code);
        self.events.publish(LabEvent::game_updated(&game));
        Ok(game)
    }

    /// Explicit waiting → active transition by a facilitator.
    pub fn start_game(
        &mut self,
        game_id: GameId,
        caller: Option<&str>,
        now_micros: i64,
    ) -> Result<Game> {
        let caller = authenticated(caller)?;
        let mut game = self.load_game(game_id)?;
        self.require_facilitator(&game, caller)?;
        game.start(self.config, now_micros)?;
        self.store.update_game(&game)?;
        log::info!("game {} started by {}", game.id, caller);
        self.events.publish(LabEvent::game_updated(&game));
        Ok(game)
    }

    /// Join (or found) a team.
    ///
    /// Returns the caller's existing team unchanged if they already have one
    /// in this game. Otherwise the caller joins the team with a matching
    /// name, or founds a new one. Founding the team that reaches the
    /// auto-start threshold starts the game.
    pub fn join_team(
        &mut self,
        game_id: GameId,
        caller: Option<&str>,
        team_name: &str,
        now_micros: i64,
    ) -> Result<Team> {
        let caller = authenticated(caller)?;
        let mut game = self.load_game(game_id)?;
        let teams = self.store.teams(game_id)?;

        if let Some(existing) = teams.iter().find(|t| t.has_member(caller)) {
            return Ok(existing.clone());
        }
        game.require_status(GameStatus::Waiting, "join team")?;

        let wanted = team_name.trim().to_lowercase();
        let team = match teams.iter().find(|t| t.name.to_lowercase() == wanted) {
            Some(found) => {
                let mut team = found.clone();
                team.add_member(caller.to_string());
                self.store.update_team(&team)?;
                log::info!("{} joined team {} in game {}", caller, team.name, game_id);
                team
            }
            None => {
                let name =
                    ledger::validate_team_name(team_name, &teams, self.config.max_team_name_len)?;
                let team = self
                    .store
                    .insert_team(Team::new(game_id, name, caller.to_string()))?;
                log::info!("team {} founded in game {} by {}", team.name, game_id, caller);
                team
            }
        };
        self.events.publish(LabEvent::team_updated(&team));

        let team_count = self.store.teams(game_id)?.len();
        if game.should_auto_start(team_count, self.config) {
            game.start(self.config, now_micros)?;
            self.store.update_game(&game)?;
            log::info!("game {} auto-started with {} teams", game_id, team_count);
            self.events.publish(LabEvent::game_updated(&game));
        }
        Ok(team)
    }

    /// [`Self::join_team`] addressed by join code.
    pub fn join_team_by_code(
        &mut self,
        code: &str,
        caller: Option<&str>,
        team_name: &str,
        now_micros: i64,
    ) -> Result<Team> {
        let normalized = code.trim().to_uppercase();
        let game = self
            .store
            .game_by_code(&normalized)?
            .ok_or_else(|| LabError::not_found("game code", &normalized))?;
        self.join_team(game.id, caller, team_name, now_micros)
    }

    /// Record (or replace) a team's allocation for the current round.
    pub fn submit_decision(
        &mut self,
        game_id: GameId,
        team_id: TeamId,
        round_number: u32,
        allocations: Allocations,
        caller: Option<&str>,
        now_micros: i64,
    ) -> Result<Decision> {
        let game = self.load_game(game_id)?;
        let team = self.load_team(team_id)?;
        intake::validate_submission(
            &game,
            &team,
            caller,
            round_number,
            &allocations,
            &self.config.catalog,
        )?;

        let decision = Decision {
            game_id,
            team_id,
            round_number,
            allocations,
            submitted_at_micros: now_micros,
        };
        for (channel, amount, cap) in decision.over_cap(&self.config.catalog) {
            log::warn!(
                "team {} allocated {} to {} (cap {}); accepted as submitted",
                team_id,
                amount,
                channel,
                cap
            );
        }
        self.store.upsert_decision(decision.clone())?;

        let teams = self.store.teams(game_id)?;
        let submitted = self.store.decisions(game_id, round_number)?;
        self.events.publish(LabEvent::DecisionReceived {
            game_id,
            team_id,
            round_number,
            submitted: intake::submission_count(&teams, &submitted, round_number),
            team_count: teams.len(),
        });
        Ok(decision)
    }

    /// Resolve the current round with a seeded generator and record the seed.
    pub fn resolve_round_seeded(
        &mut self,
        game_id: GameId,
        caller: Option<&str>,
        now_micros: i64,
        seed: u64,
    ) -> Result<RoundOutcome> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.resolve_with(game_id, caller, now_micros, &mut rng, Some(seed))
    }

    /// Resolve the current round, apply ledgers, settle the pool and advance.
    pub fn resolve_round(
        &mut self,
        game_id: GameId,
        caller: Option<&str>,
        now_micros: i64,
        rng: &mut impl Rng,
    ) -> Result<RoundOutcome> {
        self.resolve_with(game_id, caller, now_micros, rng, None)
    }

    fn resolve_with(
        &mut self,
        game_id: GameId,
        caller: Option<&str>,
        now_micros: i64,
        rng: &mut impl Rng,
        seed: Option<u64>,
    ) -> Result<RoundOutcome> {
        let caller = authenticated(caller)?;
        let mut game = self.load_game(game_id)?;
        self.require_facilitator(&game, caller)?;
        game.require_status(GameStatus::Active, "resolve round")?;
        let round_number = game.current_round;

        if !self.store.results(game_id, round_number)?.is_empty() {
            return Err(LabError::AlreadyResolved {
                round: round_number,
            });
        }

        let teams = self.store.teams(game_id)?;
        let submitted = self.store.decisions(game_id, round_number)?;
        if let Some(orphan) = submitted
            .iter()
            .find(|d| !teams.iter().any(|t| t.id == d.team_id))
        {
            log::error!(
                "decision for missing team {} in game {}; aborting resolution",
                orphan.team_id,
                game_id
            );
            return Err(LabError::not_found("team", orphan.team_id));
        }

        let decisions = intake::complete_decision_set(game_id, &teams, &submitted, round_number);
        let results = resolver::resolve_round(&decisions, round_number, self.config, rng);
        let updated_teams = ledger::apply_results(&teams, &results)?;

        let pool_before = game.budget_pool;
        let pool_after = ledger::settle_pool(pool_before, &results);
        let advance = game.finish_round(pool_after, self.config, now_micros)?;

        let commit = RoundCommit {
            game_id,
            round_number,
            results,
            teams: updated_teams,
            game,
            pool_before,
            seed,
            resolved_at_micros: now_micros,
        };
        self.store.commit_round(&commit)?;

        log::info!(
            "game {} round {} resolved: spent {}, pool {} -> {}, {:?}",
            game_id,
            round_number,
            ledger::total_round_spend(&commit.results),
            pool_before,
            commit.game.budget_pool,
            advance
        );
        self.events.publish(LabEvent::game_updated(&commit.game));
        for team in &commit.teams {
            self.events.publish(LabEvent::team_updated(team));
        }

        Ok(RoundOutcome {
            round_number,
            budget_pool: commit.game.budget_pool,
            results: commit.results,
            advance,
        })
    }

    /// Results already written for a round.
    pub fn round_results(&self, game_id: GameId, round_number: u32) -> Result<Vec<RoundResult>> {
        self.load_game(game_id)?;
        self.store.results(game_id, round_number)
    }

    /// (submitted, total teams) for the current round.
    pub fn submission_progress(&self, game_id: GameId) -> Result<(usize, usize)> {
        let game = self.load_game(game_id)?;
        let teams = self.store.teams(game_id)?;
        let submitted = self.store.decisions(game_id, game.current_round)?;
        Ok((
            intake::submission_count(&teams, &submitted, game.current_round),
            teams.len(),
        ))
    }

    pub fn snapshot(&self, game_id: GameId) -> Result<GameSnapshot> {
        let game = self.load_game(game_id)?;
        let teams = self.store.teams(game_id)?;
        let submitted = self.store.decisions(game_id, game.current_round)?;
        Ok(GameSnapshot {
            standings: ledger::standings(&teams),
            submitted: intake::submission_count(&teams, &submitted, game.current_round),
            game,
            teams,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::policy::CreatorOrAdmin;

    #[test]
    fn codes_use_the_alphabet() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), GAME_CODE_LEN);
            assert!(code.bytes().all(|b| GAME_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn create_requires_identity() {
        let cfg = LabConfig::default();
        let policy = CreatorOrAdmin::default();
        let mut store = MemoryStore::new();
        let mut events: Vec<LabEvent> = Vec::new();
        let mut session = LabSession::new(&cfg, &policy, &mut store, &mut events);
        let mut rng = StdRng::seed_from_u64(1);
        let err = session.create_game(None, 0, &mut rng).unwrap_err();
        assert_eq!(err, LabError::Unauthenticated);
        assert!(events.is_empty());
    }

    #[test]
    fn joining_twice_returns_same_team() {
        let cfg = LabConfig::default();
        let policy = CreatorOrAdmin::default();
        let mut store = MemoryStore::new();
        let mut events: Vec<LabEvent> = Vec::new();
        let mut session = LabSession::new(&cfg, &policy, &mut store, &mut events);
        let mut rng = StdRng::seed_from_u64(1);
        let game = session.create_game(Some("host"), 0, &mut rng).unwrap();
        let a = session.join_team(game.id, Some("p1"), "Rockets", 0).unwrap();
        let b = session.join_team(game.id, Some("p1"), "Other", 0).unwrap();
        assert_eq!(a, b);
        assert_eq!(session.snapshot(game.id).unwrap().teams.len(), 1);
    }

    #[test]
    fn matching_name_adds_member() {
        let cfg = LabConfig::default();
        let policy = CreatorOrAdmin::default();
        let mut store = MemoryStore::new();
        let mut events: Vec<LabEvent> = Vec::new();
        let mut session = LabSession::new(&cfg, &policy, &mut store, &mut events);
        let mut rng = StdRng::seed_from_u64(1);
        let game = session.create_game(Some("host"), 0, &mut rng).unwrap();
        session.join_team(game.id, Some("p1"), "Rockets", 0).unwrap();
        let t = session.join_team(game.id, Some("p2"), " rockets ", 0).unwrap();
        assert_eq!(t.members, vec!["p1".to_string(), "p2".to_string()]);
    }
}
