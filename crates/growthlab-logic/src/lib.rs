//! Pure simulation logic for Growth Strategy Lab.
//!
//! Several teams compete over a fixed number of rounds, each round splitting
//! spend across marketing channels whose efficiency drifts over time. A
//! facilitator resolves each round; the shared budget pool shrinks until the
//! last round is played or the pool runs dry.
//!
//! This crate is independent of any database or runtime. Durable state sits
//! behind the [`store::LabStore`] contract and change notification behind
//! [`sync::EventSink`], so the same operations run inside the SpacetimeDB
//! module, the headless harness, and unit tests.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`channels`] | Marketing channel catalog (cost, cap, trend class, effect) |
//! | [`config`] | Immutable lab configuration built once and passed by reference |
//! | [`constants`] | Default budget, round and threshold values |
//! | [`error`] | Error taxonomy shared by every operation |
//! | [`hub`] | Thread-safe in-process front end over the memory store |
//! | [`intake`] | Decision validation and missing-submission synthesis |
//! | [`ledger`] | Team totals, budget pool settlement, standings |
//! | [`lifecycle`] | Game status machine (waiting → active → completed) |
//! | [`memory`] | In-memory [`store::LabStore`] with all-or-nothing round commits |
//! | [`policy`] | Facilitator authorization as an injected capability |
//! | [`resolver`] | Round resolution: downloads and efficiency per team |
//! | [`session`] | The operation surface: create, start, join, submit, resolve |
//! | [`store`] | Durable store contract and the round commit unit |
//! | [`sync`] | Typed lab events and the per-game pub/sub bus |

pub mod channels;
pub mod config;
pub mod constants;
pub mod error;
pub mod hub;
pub mod intake;
pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod policy;
pub mod resolver;
pub mod session;
pub mod store;
pub mod sync;

pub use error::{LabError, Result};

/// Game identifier assigned by the store.
pub type GameId = u64;
/// Team identifier assigned by the store.
pub type TeamId = u64;
/// Opaque authenticated caller identity (hex string on the server).
pub type PlayerId = String;
