//! Thread-safe in-process front end.
//!
//! [`LabHub`] owns a [`MemoryStore`] and an [`EventBus`] behind one lock, so
//! every operation (and in particular every round resolution) runs to
//! completion before the next starts. Request handlers on any thread share
//! the hub through an `Arc`.

use std::sync::mpsc::Receiver;
use std::sync::{Mutex, MutexGuard};

use rand::Rng;

use crate::config::LabConfig;
use crate::error::{LabError, Result};
use crate::intake::{Allocations, Decision};
use crate::ledger::Team;
use crate::lifecycle::Game;
use crate::memory::MemoryStore;
use crate::policy::CreatorOrAdmin;
use crate::session::{GameSnapshot, LabSession, RoundOutcome};
use crate::sync::{EventBus, LabEvent};
use crate::{GameId, TeamId};

#[derive(Debug, Default)]
struct HubState {
    store: MemoryStore,
    bus: EventBus,
}

/// Shared, lock-guarded lab.
#[derive(Debug)]
pub struct LabHub {
    config: LabConfig,
    policy: CreatorOrAdmin,
    state: Mutex<HubState>,
}

impl LabHub {
    pub fn new(config: LabConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            policy: CreatorOrAdmin::from_config(&config),
            config,
            state: Mutex::new(HubState::default()),
        })
    }

    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, HubState>> {
        self.state
            .lock()
            .map_err(|_| LabError::InternalStore("lab state lock poisoned".into()))
    }

    /// Run `op` with exclusive access to the store and bus.
    pub fn with_session<T>(
        &self,
        op: impl FnOnce(&mut LabSession<'_, MemoryStore, EventBus>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.lock()?;
        let HubState { store, bus } = &mut *guard;
        let mut session = LabSession::new(&self.config, &self.policy, store, bus);
        op(&mut session)
    }

    /// Receive every event published for `game_id` from now on.
    pub fn subscribe(&self, game_id: GameId) -> Result<Receiver<LabEvent>> {
        Ok(self.lock()?.bus.subscribe(game_id))
    }

    pub fn create_game(
        &self,
        caller: Option<&str>,
        now_micros: i64,
        rng: &mut impl Rng,
    ) -> Result<Game> {
        self.with_session(|s| s.create_game(caller, now_micros, rng))
    }

    pub fn start_game(&self, game_id: GameId, caller: Option<&str>, now_micros: i64) -> Result<Game> {
        self.with_session(|s| s.start_game(game_id, caller, now_micros))
    }

    pub fn join_team(
        &self,
        game_id: GameId,
        caller: Option<&str>,
        team_name: &str,
        now_micros: i64,
    ) -> Result<Team> {
        self.with_session(|s| s.join_team(game_id, caller, team_name, now_micros))
    }

    pub fn submit_decision(
        &self,
        game_id: GameId,
        team_id: TeamId,
        round_number: u32,
        allocations: Allocations,
        caller: Option<&str>,
        now_micros: i64,
    ) -> Result<Decision> {
        self.with_session(|s| {
            s.submit_decision(game_id, team_id, round_number, allocations, caller, now_micros)
        })
    }

    pub fn resolve_round(
        &self,
        game_id: GameId,
        caller: Option<&str>,
        now_micros: i64,
        seed: u64,
    ) -> Result<RoundOutcome> {
        self.with_session(|s| s.resolve_round_seeded(game_id, caller, now_micros, seed))
    }

    pub fn snapshot(&self, game_id: GameId) -> Result<GameSnapshot> {
        self.with_session(|s| s.snapshot(game_id))
    }
}
