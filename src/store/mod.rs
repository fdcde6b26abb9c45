//! Data store modules over the session-store contract

pub mod matches;
pub mod players;
pub mod session;

pub use matches::MatchStore;
pub use players::PlayerStatsStore;
pub use session::{MemorySessionStore, SessionStore, StoreError};

/// Key prefix for match snapshot records
pub const MATCH_PREFIX: &str = "match:";
/// Key prefix for player records
pub const PLAYER_PREFIX: &str = "player:";
/// Key of the matchmaking queue list
pub const MATCH_QUEUE_KEY: &str = "matchQueue";
