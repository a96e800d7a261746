//! Client-facing reducers for running lab games.
//!
//! Each reducer is a thin wrapper over `LabSession`. Errors come back to the
//! caller as strings, and SpacetimeDB rolls back whatever the reducer wrote.

use crate::store::{self, StdbEvents, StdbStore};
use crate::tables::*;
use growthlab_logic::config::LabConfig;
use growthlab_logic::policy::CreatorOrAdmin;
use growthlab_logic::session::LabSession;
use rand::rngs::StdRng;
use rand::SeedableRng;
use spacetimedb::{reducer, Identity, ReducerContext, Table};

/// Run one lab operation against the module's tables.
fn with_session<T>(
    ctx: &ReducerContext,
    op: impl FnOnce(
        &mut LabSession<'_, StdbStore<'_>, StdbEvents<'_>>,
        &str,
        i64,
    ) -> growthlab_logic::Result<T>,
) -> Result<T, String> {
    let config = store::load_config(ctx).map_err(|e| e.to_string())?;
    let policy = CreatorOrAdmin::from_config(&config);
    let mut db = StdbStore::new(ctx);
    let mut events = StdbEvents::new(ctx);
    let mut session = LabSession::new(&config, &policy, &mut db, &mut events);
    let caller = store::player_id(ctx.sender);
    let now = ctx.timestamp.to_micros_since_unix_epoch();
    op(&mut session, &caller, now).map_err(|e| {
        log::warn!("{} rejected: {}", caller, e);
        e.to_string()
    })
}

/// Mix timestamp bits with a salt into a generator seed.
fn time_seed(ctx: &ReducerContext, salt: u64) -> u64 {
    let mut z = (ctx.timestamp.to_micros_since_unix_epoch() as u64) ^ salt;
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// ============================================================================
// LIFECYCLE REDUCERS
// ============================================================================

/// Seed settings and the channel catalog on publish
#[reducer(init)]
pub fn init(ctx: &ReducerContext) -> Result<(), String> {
    let config = LabConfig::default();
    store::seed_config(ctx, &config).map_err(|e| e.to_string())?;
    log::info!(
        "Lab initialized: {} channels, pool {}, {} rounds",
        config.catalog.len(),
        config.total_budget_pool,
        config.max_rounds
    );
    Ok(())
}

/// Called when a client connects
#[reducer(client_connected)]
pub fn client_connected(ctx: &ReducerContext) {
    log::info!("Client connected: {:?}", ctx.sender);
    if ctx.db.connected_player().identity().find(ctx.sender).is_none() {
        ctx.db.connected_player().insert(ConnectedPlayer {
            identity: ctx.sender,
            connected_at: ctx.timestamp,
        });
    }
}

/// Called when a client disconnects
#[reducer(client_disconnected)]
pub fn client_disconnected(ctx: &ReducerContext) {
    log::info!("Client disconnected: {:?}", ctx.sender);
    ctx.db.connected_player().identity().delete(ctx.sender);
}

/// Grant facilitator rights on every game (owner or existing admin only)
#[reducer]
pub fn add_admin(ctx: &ReducerContext, identity: Identity) -> Result<(), String> {
    let config = store::load_config(ctx).map_err(|e| e.to_string())?;
    if !config.is_admin(&store::player_id(ctx.sender)) {
        log::warn!("{:?} tried to add an admin", ctx.sender);
        return Err("only an admin can add admins".to_string());
    }
    if ctx.db.lab_admin().identity().find(identity).is_none() {
        ctx.db.lab_admin().insert(LabAdmin {
            identity,
            added_at: ctx.timestamp,
        });
        log::info!("Admin added: {:?}", identity);
    }
    Ok(())
}

// ============================================================================
// GAME REDUCERS
// ============================================================================

#[reducer]
pub fn create_game(ctx: &ReducerContext) -> Result<(), String> {
    let salt = u64::from_le_bytes(
        ctx.sender.to_byte_array()[..8]
            .try_into()
            .unwrap_or_default(),
    );
    let mut rng = StdRng::seed_from_u64(time_seed(ctx, salt));
    with_session(ctx, |s, caller, now| s.create_game(Some(caller), now, &mut rng)).map(|_| ())
}

#[reducer]
pub fn start_game(ctx: &ReducerContext, game_id: u64) -> Result<(), String> {
    with_session(ctx, |s, caller, now| s.start_game(game_id, Some(caller), now)).map(|_| ())
}

#[reducer]
pub fn join_team(ctx: &ReducerContext, game_id: u64, team_name: String) -> Result<(), String> {
    with_session(ctx, |s, caller, now| {
        s.join_team(game_id, Some(caller), &team_name, now)
    })
    .map(|_| ())
}

#[reducer]
pub fn join_team_by_code(
    ctx: &ReducerContext,
    code: String,
    team_name: String,
) -> Result<(), String> {
    with_session(ctx, |s, caller, now| {
        s.join_team_by_code(&code, Some(caller), &team_name, now)
    })
    .map(|_| ())
}

#[reducer]
pub fn submit_decision(
    ctx: &ReducerContext,
    game_id: u64,
    team_id: u64,
    round_number: u32,
    allocations: Vec<ChannelSpend>,
) -> Result<(), String> {
    let allocations = store::allocations_from_wire(allocations);
    with_session(ctx, |s, caller, now| {
        s.submit_decision(game_id, team_id, round_number, allocations, Some(caller), now)
    })
    .map(|_| ())
}

/// Resolve the current round. The seed lands in `round_resolution`.
#[reducer]
pub fn resolve_round(ctx: &ReducerContext, game_id: u64) -> Result<(), String> {
    let seed = time_seed(ctx, game_id);
    let outcome = with_session(ctx, |s, caller, now| {
        s.resolve_round_seeded(game_id, Some(caller), now, seed)
    })?;
    log::info!(
        "Game {} round {} resolved ({} teams), pool now {}",
        game_id,
        outcome.round_number,
        outcome.results.len(),
        outcome.budget_pool
    );
    Ok(())
}
