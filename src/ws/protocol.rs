//! WebSocket protocol message definitions
//! These are the wire types for client-server communication
//!
//! Every frame is an `{ "action": ..., "data": ... }` envelope, realized as
//! adjacently-tagged enums so payloads are decoded exactly once.

use serde::{Deserialize, Serialize};

/// Match kinds controlling the join window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// Joinable through matchmaking during Lobby and Countdown
    PublicOpen,
    /// Joinable by invite code during Lobby only
    PrivateInvite,
}

/// Match-level state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPhase {
    /// Waiting for players
    Lobby,
    /// Countdown before the round starts
    Countdown,
    /// Round in progress
    Active,
    /// Round over, match torn down after the finishing broadcast
    Finished,
}

/// Per-player progress within an active round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressState {
    /// Retyping the passage
    Typing,
    /// Passage done (or round timer elapsed), picking an author
    Guessing,
    /// Guess submitted
    Completed,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Liveness check
    Ping,

    /// Join the bound match under a display name
    RegisterPlayer { name: String },

    /// Start the pre-round countdown (re-issue queries remaining time)
    StartCountdown {},

    /// One keystroke
    PlayerMove { key: String },

    /// Author guess after typing completes
    PlayerGuess { guess: String },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
#[serde(rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Liveness reply
    Pong,

    /// Sent once on connect so the client knows the join-window policy
    SendGameType { kind: MatchKind },

    /// Roster snapshot, recomputed per recipient (`is_user` is relative)
    SendActivePlayers(Vec<PlayerInfo>),

    /// Countdown started, or remaining time on re-query
    StartCountdown {
        state: MatchPhase,
        /// Seconds until the round starts
        clock: u64,
    },

    /// Round started
    StartGame {
        state: MatchPhase,
        passage: String,
        author_choices: Vec<String>,
    },

    /// Round over: author reveal
    StartFinish {
        state: MatchPhase,
        author: String,
        author_handle: String,
    },

    /// Command rejection or transport-level error, issuer only
    Error { message: String },
}

/// Player info for roster broadcasts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub name: String,
    /// Equipped cosmetic image link, if any
    pub keyboard_link: Option<String>,
    pub speed: f64,
    pub points: f64,
    pub progress_state: ProgressState,
    /// True when this entry describes the recipient
    pub is_user: bool,
    pub placement: u32,
    pub is_creator: bool,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub cursor: usize,
}
