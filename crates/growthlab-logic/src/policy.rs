//! Facilitator authorization.
//!
//! Who may start a game or resolve its rounds is a policy handed to the
//! session, not something the simulation hardcodes. The standard policy
//! admits the game's creator plus the configured admin allow-list.

use crate::config::LabConfig;
use crate::lifecycle::Game;

/// Decides whether a caller may act as facilitator for a game.
pub trait AccessPolicy {
    fn can_facilitate(&self, game: &Game, caller: &str) -> bool;
}

/// Creator of the game, or anyone on the admin list.
#[derive(Debug, Clone, Default)]
pub struct CreatorOrAdmin {
    admins: Vec<String>,
}

impl CreatorOrAdmin {
    pub fn new(admins: Vec<String>) -> Self {
        Self { admins }
    }

    /// Admin list taken from the lab configuration.
    pub fn from_config(config: &LabConfig) -> Self {
        Self::new(config.admins.clone())
    }
}

impl AccessPolicy for CreatorOrAdmin {
    fn can_facilitate(&self, game: &Game, caller: &str) -> bool {
        game.creator == caller || self.admins.iter().any(|a| a == caller)
    }
}
