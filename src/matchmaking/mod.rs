//! Matchmaking modules

pub mod service;

pub use service::MatchmakingService;

/// Bound on queue lookups per random-join request; keeps a queue full of
/// stale entries from stalling the request
pub const MAX_QUEUE_LOOKUPS: usize = 100;
