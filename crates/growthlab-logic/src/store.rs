//! Durable store contract.
//!
//! Operations never write team ledgers or game progress piecemeal. A round's
//! results, the updated ledgers and the advanced game travel together in one
//! [`RoundCommit`] and reach the store through a single
//! [`LabStore::commit_round`] call, which must apply all of it or none of it.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::intake::Decision;
use crate::ledger::Team;
use crate::lifecycle::Game;
use crate::resolver::RoundResult;
use crate::{GameId, TeamId};

/// Everything one round resolution writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundCommit {
    pub game_id: GameId,
    pub round_number: u32,
    pub results: Vec<RoundResult>,
    /// Teams with their new totals.
    pub teams: Vec<Team>,
    /// Game after settlement and round advance.
    pub game: Game,
    /// Pool before settlement, kept for the audit trail.
    pub pool_before: u64,
    /// Seed the resolution's random source was built from, if known.
    pub seed: Option<u64>,
    pub resolved_at_micros: i64,
}

/// Point lookups, range queries and the atomic round write.
///
/// Insert methods assign ids and return the stored record.
pub trait LabStore {
    fn insert_game(&mut self, game: Game) -> Result<Game>;
    fn game(&self, id: GameId) -> Result<Option<Game>>;
    fn game_by_code(&self, code: &str) -> Result<Option<Game>>;
    fn update_game(&mut self, game: &Game) -> Result<()>;

    fn insert_team(&mut self, team: Team) -> Result<Team>;
    fn team(&self, id: TeamId) -> Result<Option<Team>>;
    fn teams(&self, game_id: GameId) -> Result<Vec<Team>>;
    fn update_team(&mut self, team: &Team) -> Result<()>;

    /// Insert or replace the decision keyed by `(team_id, round_number)`.
    fn upsert_decision(&mut self, decision: Decision) -> Result<()>;
    fn decisions(&self, game_id: GameId, round_number: u32) -> Result<Vec<Decision>>;

    fn results(&self, game_id: GameId, round_number: u32) -> Result<Vec<RoundResult>>;

    /// Apply a whole round or nothing.
    fn commit_round(&mut self, commit: &RoundCommit) -> Result<()>;
}
