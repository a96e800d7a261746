//! Growth Strategy Lab Server - SpacetimeDB Module
//!
//! Hosts lab games as a SpacetimeDB module. Every operation is a reducer,
//! so each runs as one serializable transaction: round resolution cannot
//! interleave with itself, and a failed reducer rolls back every write it
//! made. Clients subscribe to the public tables (filtered by game id) for
//! live state and to `lab_event` for typed change notifications.

mod reducers;
mod store;
mod tables;

pub use reducers::*;
pub use tables::*;
