//! Team ledger: cumulative spend and downloads, pool settlement, standings.
//!
//! Ledgers only move when a round's results are applied. Application is
//! computed here as new values; the store writes them in one commit.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{LabError, Result};
use crate::resolver::{efficiency_score, RoundResult};
use crate::{GameId, PlayerId, TeamId};

/// A competing team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub game_id: GameId,
    pub name: String,
    /// Append-only while the game is waiting.
    pub members: Vec<PlayerId>,
    pub total_spent: u64,
    pub total_downloads: u64,
}

impl Team {
    pub fn new(game_id: GameId, name: String, founder: PlayerId) -> Self {
        Self {
            id: 0,
            game_id,
            name,
            members: vec![founder],
            total_spent: 0,
            total_downloads: 0,
        }
    }

    pub fn has_member(&self, who: &str) -> bool {
        self.members.iter().any(|m| m == who)
    }

    /// Returns false if `who` was already a member.
    pub fn add_member(&mut self, who: PlayerId) -> bool {
        if self.has_member(&who) {
            return false;
        }
        self.members.push(who);
        true
    }

    /// Downloads per 100,000 spent across all resolved rounds.
    pub fn cumulative_efficiency(&self) -> f64 {
        efficiency_score(self.total_downloads, self.total_spent)
    }

    fn credit(&mut self, result: &RoundResult) {
        self.total_spent = self.total_spent.saturating_add(result.round_spending);
        self.total_downloads = self.total_downloads.saturating_add(result.downloads_earned);
    }
}

/// Trim and check a proposed team name against the game's existing teams.
pub fn validate_team_name(name: &str, existing: &[Team], max_len: usize) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LabError::InvalidTeamName("name is empty".into()));
    }
    if trimmed.chars().count() > max_len {
        return Err(LabError::InvalidTeamName(format!(
            "name longer than {} characters",
            max_len
        )));
    }
    if existing
        .iter()
        .any(|t| t.name.to_lowercase() == trimmed.to_lowercase())
    {
        return Err(LabError::InvalidTeamName(format!(
            "\"{}\" is already taken",
            trimmed
        )));
    }
    Ok(trimmed.to_string())
}

/// Pool after a round: `max(0, before − Σ round_spending)`.
pub fn settle_pool(before: u64, results: &[RoundResult]) -> u64 {
    let spent = total_round_spend(results);
    before.saturating_sub(spent)
}

pub fn total_round_spend(results: &[RoundResult]) -> u64 {
    results
        .iter()
        .fold(0u64, |acc, r| acc.saturating_add(r.round_spending))
}

/// Credit every result to its team.
///
/// Returns updated copies of exactly the teams named by `results`. A result
/// for a team missing from `teams` is an invariant violation and fails the
/// whole application, so nothing partial leaks into the pool accounting.
pub fn apply_results(teams: &[Team], results: &[RoundResult]) -> Result<Vec<Team>> {
    let mut updated = Vec::with_capacity(results.len());
    for result in results {
        let mut team = teams
            .iter()
            .find(|t| t.id == result.team_id)
            .cloned()
            .ok_or_else(|| LabError::not_found("team", result.team_id))?;
        team.credit(result);
        updated.push(team);
    }
    Ok(updated)
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    /// 1-based; tied teams share a rank.
    pub rank: usize,
    pub team_id: TeamId,
    pub name: String,
    pub total_downloads: u64,
    pub total_spent: u64,
    pub efficiency: f64,
}

/// Rank by downloads, then cumulative efficiency, then name.
pub fn standings(teams: &[Team]) -> Vec<Standing> {
    let mut sorted: Vec<&Team> = teams.iter().collect();
    sorted.sort_by(|a, b| {
        b.total_downloads
            .cmp(&a.total_downloads)
            .then_with(|| {
                b.cumulative_efficiency()
                    .partial_cmp(&a.cumulative_efficiency())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut rows: Vec<Standing> = Vec::with_capacity(sorted.len());
    for (i, t) in sorted.into_iter().enumerate() {
        let efficiency = t.cumulative_efficiency();
        let rank = match rows.last() {
            Some(prev) if prev.total_downloads == t.total_downloads && prev.efficiency == efficiency => {
                prev.rank
            }
            _ => i + 1,
        };
        rows.push(Standing {
            rank,
            team_id: t.id,
            name: t.name.clone(),
            total_downloads: t.total_downloads,
            total_spent: t.total_spent,
            efficiency,
        });
    }
    rows
}
