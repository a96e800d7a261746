//! SpacetimeDB table definitions for the lab.
//!
//! Each table mirrors a record from growthlab-logic, stored in SpacetimeDB
//! for persistence and multiplayer sync. Enum-like columns are `u8` and use
//! the `as_u8`/`from_u8` conversions on the logic types.

use spacetimedb::{table, Identity, SpacetimeType, Timestamp};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Lab settings singleton (id always 0)
#[table(name = lab_settings, public)]
#[derive(Clone)]
pub struct LabSettings {
    #[primary_key]
    pub id: u32,
    pub total_budget_pool: u64,
    pub max_rounds: u32,
    pub auto_start_team_count: u32,
    pub saturation_threshold: u64,
    pub competition_multiplier: f64,
    pub round_duration_secs: u64,
    pub max_team_name_len: u32,
    /// Identity that published the module
    pub owner: Identity,
}

/// Admin allow-list entry
#[table(name = lab_admin, public)]
pub struct LabAdmin {
    #[primary_key]
    pub identity: Identity,
    pub added_at: Timestamp,
}

/// Marketing channel (static catalog, seeded at init)
#[table(name = channel, public)]
#[derive(Clone)]
pub struct Channel {
    #[primary_key]
    pub id: String,
    pub name: String,
    pub cost_per_thousand: u64,
    pub max_spend: u64,
    pub trend: u8,          // TrendClass as u8
    pub effect: u8,         // SpecialEffect as u8
    pub sort_order: u32,
}

// ============================================================================
// GAMES & TEAMS
// ============================================================================

/// One lab game
#[table(name = game, public)]
#[derive(Clone)]
pub struct Game {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[unique]
    pub code: String,
    pub status: u8,         // GameStatus as u8
    pub current_round: u32,
    pub budget_pool: u64,
    /// Advisory; nothing enforces it
    pub round_deadline: Option<Timestamp>,
    pub creator: Identity,
    pub created_at: Timestamp,
}

/// Competing team with its running ledger
#[table(name = team, public)]
#[derive(Clone)]
pub struct Team {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub game_id: u64,
    pub name: String,
    pub members: Vec<Identity>,
    pub total_spent: u64,
    pub total_downloads: u64,
}

// ============================================================================
// ROUNDS
// ============================================================================

/// Amount put into one channel
#[derive(SpacetimeType, Clone, Debug)]
pub struct ChannelSpend {
    pub channel_id: String,
    pub amount: u64,
}

/// One team's allocation for one round; at most one per (team, round)
#[table(name = decision, public)]
#[derive(Clone)]
pub struct Decision {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub game_id: u64,
    #[index(btree)]
    pub team_id: u64,
    pub round_number: u32,
    pub allocations: Vec<ChannelSpend>,
    pub submitted_at: Timestamp,
}

/// Resolved outcome for one team in one round (write-once)
#[table(name = round_result, public)]
pub struct RoundResult {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub game_id: u64,
    #[index(btree)]
    pub team_id: u64,
    pub round_number: u32,
    pub downloads_earned: u64,
    pub efficiency_score: f64,
    pub round_spending: u64,
    pub events: Vec<String>,
}

/// Audit row per resolution; the seed replays the volatile draws
#[table(name = round_resolution, public)]
pub struct RoundResolution {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub game_id: u64,
    pub round_number: u32,
    pub seed: Option<u64>,
    pub total_spend: u64,
    pub pool_before: u64,
    pub pool_after: u64,
    pub resolved_by: Identity,
    pub resolved_at: Timestamp,
}

// ============================================================================
// SYNC
// ============================================================================

/// Typed change notification; clients subscribe filtered by game_id
#[table(name = lab_event, public)]
pub struct LabEvent {
    #[primary_key]
    #[auto_inc]
    pub id: u64,
    #[index(btree)]
    pub game_id: u64,
    pub kind: String,       // game_updated | team_updated | decision_received
    pub payload: String,    // JSON-encoded growthlab_logic::sync::LabEvent
    pub created_at: Timestamp,
}

/// Connected client session
#[table(name = connected_player, public)]
pub struct ConnectedPlayer {
    #[primary_key]
    pub identity: Identity,
    pub connected_at: Timestamp,
}
