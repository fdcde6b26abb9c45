//! Match orchestration modules

pub mod r#match;
pub mod scoring;

pub use r#match::{GameMatch, MatchHandle, MatchRegistry, MatchState, PlayerState};

use uuid::Uuid;

use crate::util::time::unix_millis;
use crate::ws::protocol::ServerMsg;

/// Maximum roster size per match
pub const MAX_PLAYERS_PER_MATCH: usize = 6;
/// Minimum roster size to start the countdown
pub const MIN_PLAYERS_TO_START: usize = 2;
/// Points awarded for a correct author guess
pub const GUESS_BONUS_POINTS: f64 = 10.0;
/// Round time limit in seconds
pub const ROUND_TIME_LIMIT_SECS: u64 = 30;
/// Countdown duration for invite matches
pub const COUNTDOWN_PRIVATE_SECS: u64 = 5;
/// Countdown duration for public matches; longer so matchmaking joins can
/// still land during Countdown
pub const COUNTDOWN_PUBLIC_SECS: u64 = 10;
/// Age after which an abandoned match is reaped regardless of roster
pub const STALE_MATCH_SECS: u64 = 60 * 60;

/// A command submitted into a match's serialization domain
#[derive(Debug, Clone)]
pub enum MatchCommand {
    /// Join the match under a display name
    Join {
        name: String,
        cosmetic_link: Option<String>,
    },
    /// Leave the match (explicit or synthesized on disconnect)
    Leave,
    /// Start the countdown, or query remaining time during one
    StartCountdown,
    /// One keystroke
    TypeKey { key: String },
    /// Author guess
    Guess { guess: String },
    /// Liveness check
    Ping,

    // Internal commands, submitted by timer tasks and the reaper.
    // Handlers re-validate the phase at fire time, so a stale submission
    // is a no-op.
    /// Countdown timer fired
    CountdownElapsed,
    /// Round timer fired
    RoundTimeElapsed,
    /// Stale-match reaper fired
    Expire,
}

/// Command plus issuing player, as consumed by the coordinator
#[derive(Debug, Clone)]
pub struct PlayerCommand {
    pub player_id: Uuid,
    pub command: MatchCommand,
    pub received_at: u64,
}

impl PlayerCommand {
    pub fn new(player_id: Uuid, command: MatchCommand) -> Self {
        Self {
            player_id,
            command,
            received_at: unix_millis(),
        }
    }

    /// A command with no issuing player (timers, reaper)
    pub fn internal(command: MatchCommand) -> Self {
        Self::new(Uuid::nil(), command)
    }
}

/// Outbound broadcast envelope; `target = None` fans out to every connection
#[derive(Debug, Clone)]
pub struct Outbound {
    pub target: Option<Uuid>,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn all(msg: ServerMsg) -> Self {
        Self { target: None, msg }
    }

    pub fn to(player_id: Uuid, msg: ServerMsg) -> Self {
        Self {
            target: Some(player_id),
            msg,
        }
    }

    /// Whether a connection for `player_id` should deliver this envelope
    pub fn is_for(&self, player_id: Uuid) -> bool {
        self.target.is_none() || self.target == Some(player_id)
    }
}

/// Why a command was rejected; sent to the issuer as `error{message}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandRejection {
    #[error("match is full")]
    MatchFull,

    #[error("match has already started")]
    MatchClosed,

    #[error("not enough players to start")]
    NotEnoughPlayers,
}
