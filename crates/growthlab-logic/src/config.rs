//! Lab configuration.
//!
//! One immutable [`LabConfig`] is built when the process (or, on the server,
//! the transaction) starts and handed by reference to every operation. There
//! is no global state: the catalog, budget constants and admin allow-list all
//! live here.

use serde::{Deserialize, Serialize};

use crate::channels::ChannelCatalog;
use crate::constants;
use crate::error::{LabError, Result};
use crate::PlayerId;

/// Every tunable the simulation reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabConfig {
    pub catalog: ChannelCatalog,
    /// Budget pool each new game starts with.
    pub total_budget_pool: u64,
    /// Rounds in a full game (rounds are numbered 1..=max_rounds).
    pub max_rounds: u32,
    /// Team count that auto-starts a waiting game.
    pub auto_start_team_count: usize,
    /// Aggregate per-channel spend that triggers the competition penalty.
    pub saturation_threshold: u64,
    pub competition_multiplier: f64,
    /// Advisory round length used to stamp deadlines.
    pub round_duration_secs: u64,
    pub max_team_name_len: usize,
    /// Identities allowed to facilitate any game.
    pub admins: Vec<PlayerId>,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            catalog: ChannelCatalog::standard(),
            total_budget_pool: constants::TOTAL_BUDGET_POOL,
            max_rounds: constants::MAX_ROUNDS,
            auto_start_team_count: constants::AUTO_START_TEAM_COUNT,
            saturation_threshold: constants::SATURATION_THRESHOLD,
            competition_multiplier: constants::COMPETITION_MULTIPLIER,
            round_duration_secs: constants::ROUND_DURATION_SECS,
            max_team_name_len: constants::MAX_TEAM_NAME_LEN,
            admins: Vec::new(),
        }
    }
}

impl LabConfig {
    /// Reject settings the lifecycle and resolver cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.catalog.validate()?;
        if self.max_rounds == 0 {
            return Err(LabError::InvalidConfig("max_rounds must be at least 1".into()));
        }
        if self.auto_start_team_count == 0 {
            return Err(LabError::InvalidConfig(
                "auto_start_team_count must be at least 1".into(),
            ));
        }
        if !(self.competition_multiplier > 0.0 && self.competition_multiplier <= 1.0) {
            return Err(LabError::InvalidConfig(format!(
                "competition_multiplier {} outside (0, 1]",
                self.competition_multiplier
            )));
        }
        if self.max_team_name_len == 0 {
            return Err(LabError::InvalidConfig("max_team_name_len must be positive".into()));
        }
        // Both are stored as u32 columns.
        for (field, value) in [
            ("auto_start_team_count", self.auto_start_team_count),
            ("max_team_name_len", self.max_team_name_len),
        ] {
            if u32::try_from(value).is_err() {
                return Err(LabError::InvalidConfig(format!(
                    "{} {} does not fit in u32",
                    field, value
                )));
            }
        }
        Ok(())
    }

    /// Builder-style helper used by tests and the harness.
    pub fn with_admin(mut self, admin: impl Into<PlayerId>) -> Self {
        self.admins.push(admin.into());
        self
    }

    pub fn is_admin(&self, who: &str) -> bool {
        self.admins.iter().any(|a| a == who)
    }

    /// Advisory deadline for a round that opens at `now_micros`.
    pub fn round_deadline(&self, now_micros: i64) -> i64 {
        let secs = i64::try_from(self.round_duration_secs).unwrap_or(i64::MAX);
        now_micros.saturating_add(secs.saturating_mul(1_000_000))
    }
}
