//! Match state and the authoritative coordinator
//!
//! Each match is an actor: one tokio task owns the `MatchState` and consumes
//! a single command channel, so two mutations of the same match can never
//! interleave. Connections and timers only ever submit commands.

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::RoundPassage;
use crate::store::players::MatchResult;
use crate::store::{MatchStore, PlayerStatsStore};
use crate::util::time::unix_millis;
use crate::ws::protocol::{MatchKind, MatchPhase, PlayerInfo, ProgressState, ServerMsg};

use super::scoring;
use super::{
    CommandRejection, MatchCommand, Outbound, PlayerCommand, COUNTDOWN_PRIVATE_SECS,
    COUNTDOWN_PUBLIC_SECS, GUESS_BONUS_POINTS, MAX_PLAYERS_PER_MATCH, MIN_PLAYERS_TO_START,
    ROUND_TIME_LIMIT_SECS,
};

impl MatchKind {
    /// Whether a match of this kind admits joins in the given phase
    pub fn join_window_open(self, phase: MatchPhase) -> bool {
        match self {
            MatchKind::PrivateInvite => phase == MatchPhase::Lobby,
            MatchKind::PublicOpen => matches!(phase, MatchPhase::Lobby | MatchPhase::Countdown),
        }
    }
}

/// Player state in a match (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub player_id: Uuid,
    pub name: String,
    /// First joiner; never reassigned
    pub is_host: bool,
    pub cosmetic_link: Option<String>,

    pub progress: ProgressState,
    /// Characters of the passage correctly retyped so far
    pub cursor: usize,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub typing_started_at: Option<u64>,
    pub typing_ended_at: Option<u64>,

    pub points: f64,
    pub speed: f64,
    /// 0 until the match finishes, then 1..N
    pub placement: u32,
}

impl PlayerState {
    pub fn new(player_id: Uuid, name: String, is_host: bool, cosmetic_link: Option<String>) -> Self {
        Self {
            player_id,
            name,
            is_host,
            cosmetic_link,
            progress: ProgressState::Typing,
            cursor: 0,
            correct_count: 0,
            incorrect_count: 0,
            typing_started_at: None,
            typing_ended_at: None,
            points: 0.0,
            speed: 0.0,
            placement: 0,
        }
    }
}

/// Match state (owned by the coordinator task)
pub struct MatchState {
    pub id: Uuid,
    pub kind: MatchKind,
    pub phase: MatchPhase,
    /// Insertion-ordered so the placement tie-break is join order
    pub roster: IndexMap<Uuid, PlayerState>,
    pub passage: String,
    passage_chars: Vec<char>,
    pub true_author: String,
    pub author_handle: String,
    pub author_choices: Vec<String>,
    pub created_at: u64,
    pub countdown_started_at: Option<u64>,
}

impl MatchState {
    pub fn new(id: Uuid, kind: MatchKind, round: RoundPassage) -> Self {
        let passage_chars = round.passage.chars().collect();
        Self {
            id,
            kind,
            phase: MatchPhase::Lobby,
            roster: IndexMap::new(),
            passage: round.passage,
            passage_chars,
            true_author: round.author,
            author_handle: round.author_handle,
            author_choices: round.author_choices,
            created_at: unix_millis(),
            countdown_started_at: None,
        }
    }

    /// Passage length in characters
    pub fn passage_len(&self) -> usize {
        self.passage_chars.len()
    }

    pub fn countdown_secs(&self) -> u64 {
        match self.kind {
            MatchKind::PrivateInvite => COUNTDOWN_PRIVATE_SECS,
            MatchKind::PublicOpen => COUNTDOWN_PUBLIC_SECS,
        }
    }

    /// Seconds left on a running countdown
    pub fn countdown_remaining_secs(&self, now_ms: u64) -> u64 {
        let Some(started) = self.countdown_started_at else {
            return 0;
        };
        let total_ms = self.countdown_secs() * 1000;
        total_ms
            .saturating_sub(now_ms.saturating_sub(started))
            .div_ceil(1000)
    }

    fn admits_join(&self) -> Result<(), CommandRejection> {
        if self.roster.len() >= MAX_PLAYERS_PER_MATCH {
            return Err(CommandRejection::MatchFull);
        }
        if !self.kind.join_window_open(self.phase) {
            return Err(CommandRejection::MatchClosed);
        }
        Ok(())
    }

    fn all_completed(&self) -> bool {
        !self.roster.is_empty()
            && self
                .roster
                .values()
                .all(|p| p.progress == ProgressState::Completed)
    }
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub kind: MatchKind,
    pub created_at: u64,
    pub cmd_tx: mpsc::Sender<PlayerCommand>,
    pub outbound_tx: broadcast::Sender<Outbound>,
    player_count: Arc<AtomicUsize>,
    phase: Arc<RwLock<MatchPhase>>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Live phase, written only by the coordinator task
    pub fn phase(&self) -> MatchPhase {
        *self.phase.read()
    }

    /// Join-window check for the HTTP surface
    pub fn accepts_joins(&self) -> bool {
        self.kind.join_window_open(self.phase())
    }
}

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches.iter().map(|m| m.value().player_count()).sum()
    }

    /// Handles older than `max_age_ms`, for the reaper
    pub fn stale_handles(&self, max_age_ms: u64, now_ms: u64) -> Vec<MatchHandle> {
        self.matches
            .iter()
            .filter(|m| now_ms.saturating_sub(m.value().created_at) > max_age_ms)
            .map(|m| m.value().clone())
            .collect()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative match coordinator
pub struct GameMatch {
    state: MatchState,
    /// Kept so timer tasks can submit back into the same channel
    cmd_tx: mpsc::Sender<PlayerCommand>,
    cmd_rx: mpsc::Receiver<PlayerCommand>,
    outbound_tx: broadcast::Sender<Outbound>,
    player_count: Arc<AtomicUsize>,
    phase_cell: Arc<RwLock<MatchPhase>>,
    match_store: MatchStore,
    stats_store: PlayerStatsStore,
}

impl GameMatch {
    /// Create a new match coordinator and its handle
    pub fn new(
        id: Uuid,
        kind: MatchKind,
        round: RoundPassage,
        match_store: MatchStore,
        stats_store: PlayerStatsStore,
    ) -> (Self, MatchHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (outbound_tx, _) = broadcast::channel(64);
        let player_count = Arc::new(AtomicUsize::new(0));
        let phase_cell = Arc::new(RwLock::new(MatchPhase::Lobby));

        let state = MatchState::new(id, kind, round);

        let handle = MatchHandle {
            id,
            kind,
            created_at: state.created_at,
            cmd_tx: cmd_tx.clone(),
            outbound_tx: outbound_tx.clone(),
            player_count: player_count.clone(),
            phase: phase_cell.clone(),
        };

        let game_match = Self {
            state,
            cmd_tx,
            cmd_rx,
            outbound_tx,
            player_count,
            phase_cell,
            match_store,
            stats_store,
        };

        (game_match, handle)
    }

    /// Run the coordinator until the match tears down
    pub async fn run(mut self) {
        info!(match_id = %self.state.id, kind = ?self.state.kind, "Match coordinator started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            if self.apply(cmd).await {
                break;
            }
        }

        info!(match_id = %self.state.id, "Match coordinator stopped");
    }

    /// Apply one command; returns true when the match should tear down
    async fn apply(&mut self, cmd: PlayerCommand) -> bool {
        let player_id = cmd.player_id;
        match cmd.command {
            MatchCommand::Join { name, cosmetic_link } => {
                self.handle_join(player_id, name, cosmetic_link).await;
                false
            }
            MatchCommand::Leave => self.handle_leave(player_id).await,
            MatchCommand::StartCountdown => {
                self.handle_start_countdown(player_id).await;
                false
            }
            MatchCommand::TypeKey { key } => {
                self.handle_type_key(player_id, &key);
                false
            }
            MatchCommand::Guess { guess } => self.handle_guess(player_id, &guess).await,
            MatchCommand::Ping => {
                self.send_to(player_id, ServerMsg::Pong);
                false
            }
            MatchCommand::CountdownElapsed => {
                self.handle_countdown_elapsed().await;
                false
            }
            MatchCommand::RoundTimeElapsed => {
                self.handle_round_time_elapsed();
                false
            }
            MatchCommand::Expire => self.handle_expire(),
        }
    }

    async fn handle_join(&mut self, player_id: Uuid, name: String, cosmetic_link: Option<String>) {
        if self.state.roster.contains_key(&player_id) {
            warn!(match_id = %self.state.id, player_id = %player_id, "Player already in match");
            return;
        }

        if let Err(rejection) = self.state.admits_join() {
            self.reject(player_id, rejection);
            return;
        }

        let is_host = self.state.roster.is_empty();
        self.state
            .roster
            .insert(player_id, PlayerState::new(player_id, name, is_host, cosmetic_link));
        self.player_count
            .store(self.state.roster.len(), Ordering::Relaxed);

        if let Err(e) = self.match_store.add_player(self.state.id, player_id).await {
            warn!(match_id = %self.state.id, error = %e, "Failed to persist roster addition");
        }

        info!(
            match_id = %self.state.id,
            player_id = %player_id,
            roster_size = self.state.roster.len(),
            "Player joined match"
        );

        self.send_active_players();
    }

    async fn handle_leave(&mut self, player_id: Uuid) -> bool {
        if self.state.roster.shift_remove(&player_id).is_none() {
            return false;
        }
        self.player_count
            .store(self.state.roster.len(), Ordering::Relaxed);

        if let Err(e) = self.match_store.remove_player(self.state.id, player_id).await {
            warn!(match_id = %self.state.id, error = %e, "Failed to persist roster removal");
        }

        info!(
            match_id = %self.state.id,
            player_id = %player_id,
            roster_size = self.state.roster.len(),
            "Player left match"
        );

        if self.state.roster.is_empty() {
            info!(match_id = %self.state.id, "Roster empty, tearing match down");
            return true;
        }

        self.send_active_players();

        // A departure can leave everyone remaining already done
        if self.state.phase == MatchPhase::Active && self.state.all_completed() {
            return self.finalize().await;
        }

        false
    }

    async fn handle_start_countdown(&mut self, player_id: Uuid) {
        match self.state.phase {
            MatchPhase::Countdown => {
                // Idempotent re-query: remaining time, timer untouched
                let clock = self.state.countdown_remaining_secs(unix_millis());
                self.send_to(
                    player_id,
                    ServerMsg::StartCountdown {
                        state: MatchPhase::Countdown,
                        clock,
                    },
                );
            }
            MatchPhase::Lobby => {
                if self.state.roster.len() < MIN_PLAYERS_TO_START {
                    self.reject(player_id, CommandRejection::NotEnoughPlayers);
                    return;
                }

                let clock = self.state.countdown_secs();
                self.set_phase(MatchPhase::Countdown);
                self.state.countdown_started_at = Some(unix_millis());
                self.persist_phase().await;

                self.send_all(ServerMsg::StartCountdown {
                    state: MatchPhase::Countdown,
                    clock,
                });
                self.schedule(MatchCommand::CountdownElapsed, Duration::from_secs(clock));

                info!(match_id = %self.state.id, seconds = clock, "Countdown started");
            }
            _ => self.reject(player_id, CommandRejection::MatchClosed),
        }
    }

    async fn handle_countdown_elapsed(&mut self) {
        if self.state.phase != MatchPhase::Countdown {
            return; // stale timer
        }

        self.set_phase(MatchPhase::Active);
        let now = unix_millis();
        for player in self.state.roster.values_mut() {
            player.typing_started_at = Some(now);
        }
        self.persist_phase().await;

        self.send_all(ServerMsg::StartGame {
            state: MatchPhase::Active,
            passage: self.state.passage.clone(),
            author_choices: self.state.author_choices.clone(),
        });
        self.schedule(
            MatchCommand::RoundTimeElapsed,
            Duration::from_secs(ROUND_TIME_LIMIT_SECS),
        );

        info!(match_id = %self.state.id, "Round started");
    }

    fn handle_round_time_elapsed(&mut self) {
        if self.state.phase != MatchPhase::Active {
            return; // stale timer
        }

        let now = unix_millis();
        let mut advanced = false;
        for player in self.state.roster.values_mut() {
            if player.progress == ProgressState::Typing {
                player.typing_ended_at = Some(now);
                player.progress = ProgressState::Guessing;
                advanced = true;
            }
        }

        if advanced {
            info!(match_id = %self.state.id, "Round timer elapsed, forcing guess phase");
            self.send_active_players();
        }
    }

    fn handle_type_key(&mut self, player_id: Uuid, key: &str) {
        if self.state.phase != MatchPhase::Active {
            return;
        }

        let passage_len = self.state.passage_chars.len();
        let expected = {
            let Some(player) = self.state.roster.get(&player_id) else {
                return;
            };
            if player.progress != ProgressState::Typing {
                return;
            }
            self.state.passage_chars.get(player.cursor).copied()
        };

        let Some(player) = self.state.roster.get_mut(&player_id) else {
            return;
        };

        let typed = single_char(key);
        if typed.is_some() && typed == expected {
            player.cursor += 1;
            player.correct_count += 1;
        } else if player.cursor != passage_len {
            player.incorrect_count += 1;
        }

        if player.cursor == passage_len {
            player.typing_ended_at = Some(unix_millis());
            player.progress = ProgressState::Guessing;
        }

        self.send_active_players();
    }

    async fn handle_guess(&mut self, player_id: Uuid, guess: &str) -> bool {
        if self.state.phase != MatchPhase::Active {
            return false;
        }

        let correct = guess == self.state.true_author;
        let Some(player) = self.state.roster.get_mut(&player_id) else {
            return false;
        };
        if player.progress != ProgressState::Guessing {
            return false;
        }

        if correct {
            player.points += GUESS_BONUS_POINTS;
        }
        player.progress = ProgressState::Completed;

        self.send_active_players();

        if self.state.all_completed() {
            return self.finalize().await;
        }
        false
    }

    /// Score, rank, persist, announce, and signal teardown
    async fn finalize(&mut self) -> bool {
        self.set_phase(MatchPhase::Finished);
        self.persist_phase().await;

        for player in self.state.roster.values_mut() {
            let speed = match (player.typing_started_at, player.typing_ended_at) {
                (Some(start), Some(end)) => scoring::words_per_minute(player.cursor, start, end),
                _ => 0.0,
            };
            player.speed = speed;
            player.points += speed;
        }

        scoring::assign_placements(&mut self.state.roster);

        for player in self.state.roster.values() {
            let result = MatchResult {
                speed: player.speed,
                accuracy: scoring::accuracy(player.correct_count, player.incorrect_count),
                won: player.placement == 1,
                points: player.points,
            };
            if let Err(e) = self
                .stats_store
                .record_result(player.player_id, &player.name, result)
                .await
            {
                warn!(
                    match_id = %self.state.id,
                    player_id = %player.player_id,
                    error = %e,
                    "Failed to persist match result"
                );
            }
        }

        self.send_all(ServerMsg::StartFinish {
            state: MatchPhase::Finished,
            author: self.state.true_author.clone(),
            author_handle: self.state.author_handle.clone(),
        });
        self.send_active_players();

        info!(
            match_id = %self.state.id,
            players = self.state.roster.len(),
            "Match finished"
        );
        true
    }

    fn handle_expire(&mut self) -> bool {
        info!(
            match_id = %self.state.id,
            phase = ?self.state.phase,
            "Match exceeded stale age, reaping"
        );
        self.send_all(ServerMsg::Error {
            message: "match expired".to_string(),
        });
        true
    }

    /// Spawn a timer that re-enters the serialization domain as a command
    fn schedule(&self, command: MatchCommand, after: Duration) {
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = cmd_tx.send(PlayerCommand::internal(command)).await;
        });
    }

    fn set_phase(&mut self, phase: MatchPhase) {
        self.state.phase = phase;
        *self.phase_cell.write() = phase;
    }

    async fn persist_phase(&self) {
        if let Err(e) = self
            .match_store
            .update_phase(self.state.id, self.state.phase)
            .await
        {
            warn!(match_id = %self.state.id, error = %e, "Failed to persist phase update");
        }
    }

    fn reject(&self, player_id: Uuid, rejection: CommandRejection) {
        self.send_to(
            player_id,
            ServerMsg::Error {
                message: rejection.to_string(),
            },
        );
    }

    fn send_all(&self, msg: ServerMsg) {
        let _ = self.outbound_tx.send(Outbound::all(msg));
    }

    fn send_to(&self, player_id: Uuid, msg: ServerMsg) {
        let _ = self.outbound_tx.send(Outbound::to(player_id, msg));
    }

    /// Roster broadcast, one envelope per recipient so `is_user` is relative
    fn send_active_players(&self) {
        for recipient in self.state.roster.keys() {
            let info: Vec<PlayerInfo> = self
                .state
                .roster
                .values()
                .map(|p| PlayerInfo {
                    name: p.name.clone(),
                    keyboard_link: p.cosmetic_link.clone(),
                    speed: p.speed,
                    points: p.points,
                    progress_state: p.progress,
                    is_user: p.player_id == *recipient,
                    placement: p.placement,
                    is_creator: p.is_host,
                    correct_count: p.correct_count,
                    incorrect_count: p.incorrect_count,
                    cursor: p.cursor,
                })
                .collect();
            self.send_to(*recipient, ServerMsg::SendActivePlayers(info));
        }
    }
}

fn single_char(key: &str) -> Option<char> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
