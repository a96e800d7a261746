//! In-memory [`LabStore`].
//!
//! Backs the headless harness and the integration tests. Round commits are
//! validated in full before the first mutation, so a bad commit leaves the
//! store untouched.

use std::collections::BTreeMap;

use crate::error::{LabError, Result};
use crate::intake::Decision;
use crate::ledger::Team;
use crate::lifecycle::Game;
use crate::resolver::RoundResult;
use crate::store::{LabStore, RoundCommit};
use crate::{GameId, TeamId};

#[derive(Debug, Default)]
pub struct MemoryStore {
    games: BTreeMap<GameId, Game>,
    teams: BTreeMap<TeamId, Team>,
    decisions: BTreeMap<(TeamId, u32), Decision>,
    results: BTreeMap<(TeamId, u32), RoundResult>,
    next_game_id: GameId,
    next_team_id: TeamId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LabStore for MemoryStore {
    fn insert_game(&mut self, mut game: Game) -> Result<Game> {
        if self.games.values().any(|g| g.code == game.code) {
            return Err(LabError::InternalStore(format!(
                "duplicate game code {}",
                game.code
            )));
        }
        self.next_game_id += 1;
        game.id = self.next_game_id;
        self.games.insert(game.id, game.clone());
        Ok(game)
    }

    fn game(&self, id: GameId) -> Result<Option<Game>> {
        Ok(self.games.get(&id).cloned())
    }

    fn game_by_code(&self, code: &str) -> Result<Option<Game>> {
        Ok(self.games.values().find(|g| g.code == code).cloned())
    }

    fn update_game(&mut self, game: &Game) -> Result<()> {
        let slot = self
            .games
            .get_mut(&game.id)
            .ok_or_else(|| LabError::not_found("game", game.id))?;
        *slot = game.clone();
        Ok(())
    }

    fn insert_team(&mut self, mut team: Team) -> Result<Team> {
        if !self.games.contains_key(&team.game_id) {
            return Err(LabError::not_found("game", team.game_id));
        }
        self.next_team_id += 1;
        team.id = self.next_team_id;
        self.teams.insert(team.id, team.clone());
        Ok(team)
    }

    fn team(&self, id: TeamId) -> Result<Option<Team>> {
        Ok(self.teams.get(&id).cloned())
    }

    fn teams(&self, game_id: GameId) -> Result<Vec<Team>> {
        Ok(self
            .teams
            .values()
            .filter(|t| t.game_id == game_id)
            .cloned()
            .collect())
    }

    fn update_team(&mut self, team: &Team) -> Result<()> {
        let slot = self
            .teams
            .get_mut(&team.id)
            .ok_or_else(|| LabError::not_found("team", team.id))?;
        *slot = team.clone();
        Ok(())
    }

    fn upsert_decision(&mut self, decision: Decision) -> Result<()> {
        self.decisions
            .insert((decision.team_id, decision.round_number), decision);
        Ok(())
    }

    fn decisions(&self, game_id: GameId, round_number: u32) -> Result<Vec<Decision>> {
        Ok(self
            .decisions
            .values()
            .filter(|d| d.game_id == game_id && d.round_number == round_number)
            .cloned()
            .collect())
    }

    fn results(&self, game_id: GameId, round_number: u32) -> Result<Vec<RoundResult>> {
        Ok(self
            .results
            .iter()
            .filter(|((team_id, round), _)| {
                *round == round_number
                    && self.teams.get(team_id).is_some_and(|t| t.game_id == game_id)
            })
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn commit_round(&mut self, commit: &RoundCommit) -> Result<()> {
        // Validate everything first.
        if !self.games.contains_key(&commit.game_id) || commit.game.id != commit.game_id {
            return Err(LabError::not_found("game", commit.game_id));
        }
        for team in &commit.teams {
            match self.teams.get(&team.id) {
                Some(t) if t.game_id == commit.game_id => {}
                _ => return Err(LabError::not_found("team", team.id)),
            }
        }
        for r in &commit.results {
            if self.results.contains_key(&(r.team_id, r.round_number)) {
                return Err(LabError::AlreadyResolved {
                    round: r.round_number,
                });
            }
            if !self.teams.contains_key(&r.team_id) {
                return Err(LabError::not_found("team", r.team_id));
            }
        }

        for r in &commit.results {
            self.results.insert((r.team_id, r.round_number), r.clone());
        }
        for team in &commit.teams {
            self.teams.insert(team.id, team.clone());
        }
        self.games.insert(commit.game.id, commit.game.clone());
        Ok(())
    }
}
