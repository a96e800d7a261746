//! Change notification.
//!
//! Operations publish typed [`LabEvent`]s to an [`EventSink`]; a transport
//! adapter fans them out to connected clients. Delivery is best-effort and
//! there is no replay: a client that misses events refetches a
//! [`crate::session::GameSnapshot`].
//!
//! `DecisionReceived` is a progress hint ("3 of 5 submitted") and never
//! drives resolution.

use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use serde::{Deserialize, Serialize};

use crate::ledger::Team;
use crate::lifecycle::{Game, GameStatus};
use crate::{GameId, TeamId};

/// Event classes, scoped by game id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LabEvent {
    GameUpdated {
        game_id: GameId,
        status: GameStatus,
        current_round: u32,
        budget_pool: u64,
        round_deadline_micros: Option<i64>,
    },
    TeamUpdated {
        game_id: GameId,
        team_id: TeamId,
        name: String,
        member_count: usize,
        total_spent: u64,
        total_downloads: u64,
    },
    DecisionReceived {
        game_id: GameId,
        team_id: TeamId,
        round_number: u32,
        submitted: usize,
        team_count: usize,
    },
}

impl LabEvent {
    pub fn game_updated(game: &Game) -> Self {
        LabEvent::GameUpdated {
            game_id: game.id,
            status: game.status,
            current_round: game.current_round,
            budget_pool: game.budget_pool,
            round_deadline_micros: game.round_deadline_micros,
        }
    }

    pub fn team_updated(team: &Team) -> Self {
        LabEvent::TeamUpdated {
            game_id: team.game_id,
            team_id: team.id,
            name: team.name.clone(),
            member_count: team.members.len(),
            total_spent: team.total_spent,
            total_downloads: team.total_downloads,
        }
    }

    pub fn game_id(&self) -> GameId {
        match self {
            LabEvent::GameUpdated { game_id, .. }
            | LabEvent::TeamUpdated { game_id, .. }
            | LabEvent::DecisionReceived { game_id, .. } => *game_id,
        }
    }

    /// Wire name of the event class.
    pub fn kind(&self) -> &'static str {
        match self {
            LabEvent::GameUpdated { .. } => "game_updated",
            LabEvent::TeamUpdated { .. } => "team_updated",
            LabEvent::DecisionReceived { .. } => "decision_received",
        }
    }
}

/// Ids of stored events to drop before `incoming` is appended to a game's
/// durable log. `stored` holds that game's row ids, oldest first.
///
/// A completed game has nothing left to announce, so its backlog goes when
/// the completion event arrives. Otherwise the log is trimmed to `cap`
/// rows, counting the incoming one.
pub fn expired_events(incoming: &LabEvent, stored: &[u64], cap: usize) -> Vec<u64> {
    if matches!(
        incoming,
        LabEvent::GameUpdated {
            status: GameStatus::Completed,
            ..
        }
    ) {
        return stored.to_vec();
    }
    let excess = (stored.len() + 1).saturating_sub(cap.max(1));
    stored[..excess.min(stored.len())].to_vec()
}

/// Fire-and-forget publisher.
pub trait EventSink {
    fn publish(&mut self, event: LabEvent);
}

/// Collecting sink, handy for tests and batch callers.
impl EventSink for Vec<LabEvent> {
    fn publish(&mut self, event: LabEvent) {
        self.push(event);
    }
}

/// In-process pub/sub keyed by game id.
///
/// Each subscriber gets its own channel. Subscribers whose receiver was
/// dropped are pruned on the next publish to that game.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: BTreeMap<GameId, Vec<Sender<LabEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, game_id: GameId) -> Receiver<LabEvent> {
        let (tx, rx) = channel();
        self.subscribers.entry(game_id).or_default().push(tx);
        rx
    }

    pub fn subscriber_count(&self, game_id: GameId) -> usize {
        self.subscribers.get(&game_id).map_or(0, Vec::len)
    }
}

impl EventSink for EventBus {
    fn publish(&mut self, event: LabEvent) {
        let game_id = event.game_id();
        let Some(subs) = self.subscribers.get_mut(&game_id) else {
            return;
        };
        subs.retain(|tx| tx.send(event.clone()).is_ok());
        if subs.is_empty() {
            self.subscribers.remove(&game_id);
        }
    }
}
