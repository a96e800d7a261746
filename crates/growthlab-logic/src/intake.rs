//! Decision intake.
//!
//! A decision is one team's allocation for one round, keyed by
//! `(team, round)`. Resubmitting before the round resolves replaces the
//! earlier decision. Per-channel caps are deliberately not enforced here or
//! in the resolver; clients pre-constrain them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::channels::ChannelCatalog;
use crate::error::{LabError, Result};
use crate::ledger::Team;
use crate::lifecycle::{Game, GameStatus};
use crate::{GameId, TeamId};

/// Channel id → amount allocated for the round.
pub type Allocations = BTreeMap<String, u64>;

/// One team's allocation for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub game_id: GameId,
    pub team_id: TeamId,
    pub round_number: u32,
    pub allocations: Allocations,
    pub submitted_at_micros: i64,
}

impl Decision {
    /// All-zero stand-in for a team that did not submit.
    pub fn empty(game_id: GameId, team_id: TeamId, round_number: u32) -> Self {
        Self {
            game_id,
            team_id,
            round_number,
            allocations: Allocations::new(),
            submitted_at_micros: 0,
        }
    }

    pub fn total_spend(&self) -> u64 {
        self.allocations
            .values()
            .fold(0u64, |acc, a| acc.saturating_add(*a))
    }

    /// Amounts above the channel's advertised cap, as (channel, amount, cap).
    ///
    /// Informational only; nothing clamps these.
    pub fn over_cap<'a>(&'a self, catalog: &'a ChannelCatalog) -> Vec<(&'a str, u64, u64)> {
        self.allocations
            .iter()
            .filter_map(|(id, amount)| {
                let ch = catalog.get(id)?;
                (*amount > ch.max_spend).then_some((id.as_str(), *amount, ch.max_spend))
            })
            .collect()
    }
}

/// Check a submission against identity, membership, lifecycle and catalog.
///
/// Runs before any write. `caller` is `None` when no identity was supplied.
pub fn validate_submission(
    game: &Game,
    team: &Team,
    caller: Option<&str>,
    round_number: u32,
    allocations: &Allocations,
    catalog: &ChannelCatalog,
) -> Result<()> {
    let caller = caller.ok_or(LabError::Unauthenticated)?;
    if team.game_id != game.id {
        return Err(LabError::not_found("team", team.id));
    }
    if !team.has_member(caller) {
        return Err(LabError::Forbidden(format!(
            "caller is not a member of team {}",
            team.id
        )));
    }
    game.require_status(GameStatus::Active, "submit decision")?;
    if round_number != game.current_round {
        return Err(LabError::InvalidRound {
            expected: game.current_round,
            got: round_number,
        });
    }
    if let Some(unknown) = allocations.keys().find(|id| !catalog.contains(id)) {
        return Err(LabError::UnknownChannel(unknown.clone()));
    }
    Ok(())
}

/// One decision per team for `round_number`, synthesizing empty ones for
/// teams that did not submit. Output follows the order of `teams`.
///
/// Decisions from other rounds, or for teams outside `teams`, are kept out
/// of the synthesized set; the caller decides whether the latter is fatal.
pub fn complete_decision_set(
    game_id: GameId,
    teams: &[Team],
    submitted: &[Decision],
    round_number: u32,
) -> Vec<Decision> {
    teams
        .iter()
        .map(|team| {
            submitted
                .iter()
                .find(|d| d.team_id == team.id && d.round_number == round_number)
                .cloned()
                .unwrap_or_else(|| Decision::empty(game_id, team.id, round_number))
        })
        .collect()
}

/// How many teams have a decision on file for the round.
pub fn submission_count(teams: &[Team], submitted: &[Decision], round_number: u32) -> usize {
    teams
        .iter()
        .filter(|t| {
            submitted
                .iter()
                .any(|d| d.team_id == t.id && d.round_number == round_number)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LabConfig;

    fn active_game() -> Game {
        let cfg = LabConfig::default();
        let mut g = Game::new("CODE22".into(), "host".into(), &cfg, 0);
        g.id = 1;
        g.start(&cfg, 0).unwrap();
        g
    }

    fn team(id: TeamId, member: &str) -> Team {
        let mut t = Team::new(1, "Rockets".into(), member.into());
        t.id = id;
        t
    }

    fn alloc(pairs: &[(&str, u64)]) -> Allocations {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn accepts_valid_submission() {
        let catalog = ChannelCatalog::standard();
        let res = validate_submission(
            &active_game(),
            &team(7, "alice"),
            Some("alice"),
            1,
            &alloc(&[("search_ads", 100_000)]),
            &catalog,
        );
        assert!(res.is_ok());
    }

    #[test]
    fn missing_identity_is_unauthenticated() {
        let catalog = ChannelCatalog::standard();
        let err = validate_submission(
            &active_game(),
            &team(7, "alice"),
            None,
            1,
            &Allocations::new(),
            &catalog,
        )
        .unwrap_err();
        assert_eq!(err, LabError::Unauthenticated);
    }

    #[test]
    fn non_member_is_forbidden() {
        let catalog = ChannelCatalog::standard();
        let err = validate_submission(
            &active_game(),
            &team(7, "alice"),
            Some("mallory"),
            1,
            &Allocations::new(),
            &catalog,
        )
        .unwrap_err();
        assert!(matches!(err, LabError::Forbidden(_)));
    }

    #[test]
    fn wrong_round_rejected() {
        let catalog = ChannelCatalog::standard();
        let err = validate_submission(
            &active_game(),
            &team(7, "alice"),
            Some("alice"),
            2,
            &Allocations::new(),
            &catalog,
        )
        .unwrap_err();
        assert_eq!(err, LabError::InvalidRound { expected: 1, got: 2 });
    }

    #[test]
    fn waiting_game_rejects_decisions() {
        let cfg = LabConfig::default();
        let mut g = Game::new("CODE22".into(), "host".into(), &cfg, 0);
        g.id = 1;
        let err = validate_submission(
            &g,
            &team(7, "alice"),
            Some("alice"),
            0,
            &Allocations::new(),
            &cfg.catalog,
        )
        .unwrap_err();
        assert!(matches!(err, LabError::InvalidGameState { .. }));
    }

    #[test]
    fn unknown_channel_rejected_at_intake() {
        let catalog = ChannelCatalog::standard();
        let err = validate_submission(
            &active_game(),
            &team(7, "alice"),
            Some("alice"),
            1,
            &alloc(&[("skywriting", 5)]),
            &catalog,
        )
        .unwrap_err();
        assert_eq!(err, LabError::UnknownChannel("skywriting".into()));
    }

    #[test]
    fn missing_teams_get_empty_decisions() {
        let teams = vec![team(1, "a"), team(2, "b")];
        let submitted = vec![Decision {
            game_id: 1,
            team_id: 2,
            round_number: 1,
            allocations: alloc(&[("tv", 250_000)]),
            submitted_at_micros: 5,
        }];
        let set = complete_decision_set(1, &teams, &submitted, 1);
        assert_eq!(set.len(), 2);
        assert_eq!(set[0], Decision::empty(1, 1, 1));
        assert_eq!(set[1].total_spend(), 250_000);
        assert_eq!(submission_count(&teams, &submitted, 1), 1);
        assert_eq!(submission_count(&teams, &submitted, 2), 0);
    }

    #[test]
    fn over_cap_is_reported_not_clamped() {
        let catalog = ChannelCatalog::standard();
        let d = Decision {
            game_id: 1,
            team_id: 1,
            round_number: 1,
            allocations: alloc(&[("referral", 9_000_000), ("tv", 1)]),
            submitted_at_micros: 0,
        };
        let over = d.over_cap(&catalog);
        assert_eq!(over, vec![("referral", 9_000_000, 1_500_000)]);
        assert_eq!(d.total_spend(), 9_000_001);
    }
}
