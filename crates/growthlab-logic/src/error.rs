//! Error taxonomy for lab operations.
//!
//! Validation errors are raised before any state is touched. `NotFound`
//! during resolution and `InternalStore` abort the whole operation.

use crate::lifecycle::GameStatus;

/// Errors surfaced by lab operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LabError {
    /// No caller identity was supplied.
    #[error("caller is not authenticated")]
    Unauthenticated,

    /// Caller lacks the role or team membership the operation needs.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Submitted round does not match the game's current round.
    #[error("invalid round: game is on round {expected}, got {got}")]
    InvalidRound {
        /// The game's current round.
        expected: u32,
        /// The round named by the request.
        got: u32,
    },

    /// Operation is not allowed in the game's lifecycle state.
    #[error("cannot {operation} while game is {status}")]
    InvalidGameState {
        /// Current status of the game.
        status: GameStatus,
        /// The rejected operation.
        operation: &'static str,
    },

    /// Referenced record does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Record kind ("game", "team", ...).
        entity: &'static str,
        /// Identifier or code that was looked up.
        id: String,
    },

    /// Results for this round already exist.
    #[error("round {round} has already been resolved")]
    AlreadyResolved {
        /// The round that was resolved before.
        round: u32,
    },

    /// Allocation names a channel missing from the catalog.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// Team name is empty, too long or already taken.
    #[error("invalid team name: {0}")]
    InvalidTeamName(String),

    /// Configuration is inconsistent.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Durable store operation failed.
    #[error("store error: {0}")]
    InternalStore(String),
}

impl LabError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        LabError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Convenience result type for lab operations.
pub type Result<T> = std::result::Result<T, LabError>;
