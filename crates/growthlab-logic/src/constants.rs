//! Default lab constants.
//!
//! These feed [`crate::config::LabConfig::default`]. Nothing reads them
//! directly at runtime; operations always go through the config object.

/// Shared budget pool a new game starts with (currency units).
pub const TOTAL_BUDGET_POOL: u64 = 100_000_000;

/// Number of rounds in a full game.
pub const MAX_ROUNDS: u32 = 6;

/// Team count at which a waiting game starts on its own.
pub const AUTO_START_TEAM_COUNT: usize = 5;

/// Aggregate per-channel spend above which every team on that channel is penalized.
pub const SATURATION_THRESHOLD: u64 = 5_000_000;

/// Efficiency multiplier applied when a channel is saturated.
pub const COMPETITION_MULTIPLIER: f64 = 0.9;

/// Advisory round length. The resolver never looks at it.
pub const ROUND_DURATION_SECS: u64 = 300;

/// Longest allowed team display name, in characters.
pub const MAX_TEAM_NAME_LEN: usize = 40;

/// Length of the join code handed out by `create_game`.
pub const GAME_CODE_LEN: usize = 6;

/// Join code alphabet (no 0/O or 1/I/L).
pub const GAME_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Spend unit the efficiency score is normalized to.
pub const EFFICIENCY_SPEND_UNIT: f64 = 100_000.0;

/// Rows a durable event log keeps per game before the oldest are dropped.
pub const EVENT_LOG_CAP: usize = 128;
