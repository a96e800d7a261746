//! Game lifecycle state machine.
//!
//! ```text
//! waiting ──start / auto-start──▶ active ──last round or empty pool──▶ completed
//!                                  │  ▲
//!                                  └──┘ round advance
//! ```
//!
//! Transitions only move forward. Round numbers are 1-based while the game
//! is active; a waiting game sits on round 0. When the final round resolves
//! the game completes with `current_round` left at that round, so it never
//! exceeds `max_rounds`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::LabConfig;
use crate::error::{LabError, Result};
use crate::{GameId, PlayerId};

/// Lifecycle status of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting = 0,
    Active = 1,
    Completed = 2,
}

impl GameStatus {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(GameStatus::Waiting),
            1 => Some(GameStatus::Active),
            2 => Some(GameStatus::Completed),
            _ => None,
        }
    }

    /// Whether moving to `next` is a legal forward step.
    pub fn can_transition_to(self, next: GameStatus) -> bool {
        matches!(
            (self, next),
            (GameStatus::Waiting, GameStatus::Active)
                | (GameStatus::Active, GameStatus::Active)
                | (GameStatus::Active, GameStatus::Completed)
        )
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Active => "active",
            GameStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionReason {
    RoundsExhausted,
    BudgetExhausted,
}

/// Outcome of closing a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundAdvance {
    /// Game stays active on `next_round`.
    Continued { next_round: u32 },
    Completed { reason: CompletionReason },
}

/// One game instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    /// Short join code.
    pub code: String,
    pub status: GameStatus,
    pub current_round: u32,
    /// Shared, depleting budget. Never negative, never grows while active.
    pub budget_pool: u64,
    /// Advisory only; the resolver ignores it.
    pub round_deadline_micros: Option<i64>,
    pub creator: PlayerId,
    pub created_at_micros: i64,
}

impl Game {
    /// A fresh waiting game. The store assigns the real id on insert.
    pub fn new(code: String, creator: PlayerId, config: &LabConfig, now_micros: i64) -> Self {
        Self {
            id: 0,
            code,
            status: GameStatus::Waiting,
            current_round: 0,
            budget_pool: config.total_budget_pool,
            round_deadline_micros: None,
            creator,
            created_at_micros: now_micros,
        }
    }

    /// Fail with `InvalidGameState` unless the game is in `expected`.
    pub fn require_status(&self, expected: GameStatus, operation: &'static str) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(LabError::InvalidGameState {
                status: self.status,
                operation,
            })
        }
    }

    /// Move to `next`, refusing any step the status machine forbids.
    fn transition(&mut self, next: GameStatus, operation: &'static str) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(LabError::InvalidGameState {
                status: self.status,
                operation,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.status == GameStatus::Completed
    }

    /// Auto-start fires the moment the team count reaches the threshold.
    pub fn should_auto_start(&self, team_count: usize, config: &LabConfig) -> bool {
        self.status == GameStatus::Waiting && team_count >= config.auto_start_team_count
    }

    /// waiting → active. Opens round 1 and stamps its deadline.
    pub fn start(&mut self, config: &LabConfig, now_micros: i64) -> Result<()> {
        self.require_status(GameStatus::Waiting, "start game")?;
        self.transition(GameStatus::Active, "start game")?;
        self.current_round = 1;
        self.round_deadline_micros = Some(config.round_deadline(now_micros));
        Ok(())
    }

    /// Close the current round with the already-settled pool.
    ///
    /// Stays active on the next round while rounds and budget remain;
    /// otherwise completes and clears the deadline.
    pub fn finish_round(
        &mut self,
        pool_after: u64,
        config: &LabConfig,
        now_micros: i64,
    ) -> Result<RoundAdvance> {
        self.require_status(GameStatus::Active, "resolve round")?;
        debug_assert!(pool_after <= self.budget_pool);
        self.budget_pool = pool_after.min(self.budget_pool);

        let reason = if self.budget_pool == 0 {
            Some(CompletionReason::BudgetExhausted)
        } else if self.current_round >= config.max_rounds {
            Some(CompletionReason::RoundsExhausted)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                self.transition(GameStatus::Completed, "resolve round")?;
                self.round_deadline_micros = None;
                Ok(RoundAdvance::Completed { reason })
            }
            None => {
                self.current_round += 1;
                self.round_deadline_micros = Some(config.round_deadline(now_micros));
                Ok(RoundAdvance::Continued {
                    next_round: self.current_round,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting_game(cfg: &LabConfig) -> Game {
        Game::new("ABC234".into(), "creator".into(), cfg, 0)
    }

    #[test]
    fn new_game_is_waiting_with_full_pool() {
        let cfg = LabConfig::default();
        let g = waiting_game(&cfg);
        assert_eq!(g.status, GameStatus::Waiting);
        assert_eq!(g.current_round, 0);
        assert_eq!(g.budget_pool, cfg.total_budget_pool);
        assert!(g.round_deadline_micros.is_none());
    }

    #[test]
    fn start_opens_round_one_with_deadline() {
        let cfg = LabConfig::default();
        let mut g = waiting_game(&cfg);
        g.start(&cfg, 10).unwrap();
        assert_eq!(g.status, GameStatus::Active);
        assert_eq!(g.current_round, 1);
        assert_eq!(g.round_deadline_micros, Some(cfg.round_deadline(10)));
    }

    #[test]
    fn start_twice_fails() {
        let cfg = LabConfig::default();
        let mut g = waiting_game(&cfg);
        g.start(&cfg, 0).unwrap();
        let err = g.start(&cfg, 0).unwrap_err();
        assert!(matches!(
            err,
            LabError::InvalidGameState {
                status: GameStatus::Active,
                ..
            }
        ));
    }

    #[test]
    fn finish_round_requires_active() {
        let cfg = LabConfig::default();
        let mut g = waiting_game(&cfg);
        assert!(g.finish_round(0, &cfg, 0).is_err());
    }

    #[test]
    fn plays_exactly_max_rounds() {
        let cfg = LabConfig::default();
        let mut g = waiting_game(&cfg);
        g.start(&cfg, 0).unwrap();
        let mut played = 0;
        loop {
            played += 1;
            let pool = g.budget_pool - 1;
            match g.finish_round(pool, &cfg, 0).unwrap() {
                RoundAdvance::Continued { next_round } => assert_eq!(next_round, played + 1),
                RoundAdvance::Completed { reason } => {
                    assert_eq!(reason, CompletionReason::RoundsExhausted);
                    break;
                }
            }
        }
        assert_eq!(played, cfg.max_rounds);
        assert_eq!(g.current_round, cfg.max_rounds);
        assert!(g.is_completed());
        assert!(g.round_deadline_micros.is_none());
    }

    #[test]
    fn empty_pool_completes_early() {
        let cfg = LabConfig::default();
        let mut g = waiting_game(&cfg);
        g.start(&cfg, 0).unwrap();
        let adv = g.finish_round(0, &cfg, 0).unwrap();
        assert_eq!(
            adv,
            RoundAdvance::Completed {
                reason: CompletionReason::BudgetExhausted
            }
        );
        assert_eq!(g.current_round, 1);
    }

    #[test]
    fn auto_start_threshold() {
        let cfg = LabConfig::default();
        let g = waiting_game(&cfg);
        assert!(!g.should_auto_start(4, &cfg));
        assert!(g.should_auto_start(5, &cfg));
    }

    #[test]
    fn transitions_only_move_forward() {
        use GameStatus::*;
        assert!(Waiting.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Waiting));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Waiting.can_transition_to(Completed));
    }

    #[test]
    fn backward_transition_leaves_status_alone() {
        let cfg = LabConfig::default();
        let mut g = waiting_game(&cfg);
        let err = g.transition(GameStatus::Completed, "finish").unwrap_err();
        assert!(matches!(
            err,
            LabError::InvalidGameState {
                status: GameStatus::Waiting,
                ..
            }
        ));
        assert_eq!(g.status, GameStatus::Waiting);

        g.start(&cfg, 0).unwrap();
        g.finish_round(0, &cfg, 1).unwrap();
        assert!(g.transition(GameStatus::Active, "reopen").is_err());
        assert_eq!(g.status, GameStatus::Completed);
    }

    #[test]
    fn status_display_and_u8() {
        assert_eq!(GameStatus::Completed.to_string(), "completed");
        assert_eq!(GameStatus::from_u8(1), Some(GameStatus::Active));
        assert_eq!(GameStatus::from_u8(3), None);
    }
}
