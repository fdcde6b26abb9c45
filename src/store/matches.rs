//! Match snapshot records and the durable matchmaking queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::ws::protocol::{MatchKind, MatchPhase};

use super::session::{SessionStore, StoreError};
use super::{MATCH_PREFIX, MATCH_QUEUE_KEY};

/// Snapshot TTL; matches older than this are gone from the store even if
/// the process never tore them down
pub const MATCH_RECORD_TTL: Duration = Duration::from_secs(60 * 60);

/// Durable snapshot of a match, validated by the matchmaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: Uuid,
    pub kind: MatchKind,
    pub phase: MatchPhase,
    pub players: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn new(id: Uuid, kind: MatchKind) -> Self {
        Self {
            id,
            kind,
            phase: MatchPhase::Lobby,
            players: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Match store operations
#[derive(Clone)]
pub struct MatchStore {
    store: Arc<dyn SessionStore>,
}

impl MatchStore {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    fn key(id: Uuid) -> String {
        format!("{}{}", MATCH_PREFIX, id)
    }

    /// Write a fresh match record
    pub async fn create(&self, record: &MatchRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.store
            .set(&Self::key(record.id), &json, Some(MATCH_RECORD_TTL))
            .await
    }

    /// Fetch a match record by id
    pub async fn fetch(&self, id: Uuid) -> Result<Option<MatchRecord>, StoreError> {
        match self.store.get(&Self::key(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Update the recorded phase
    pub async fn update_phase(&self, id: Uuid, phase: MatchPhase) -> Result<(), StoreError> {
        self.mutate(id, |record| record.phase = phase).await
    }

    /// Record a player joining
    pub async fn add_player(&self, id: Uuid, player_id: Uuid) -> Result<(), StoreError> {
        self.mutate(id, |record| {
            if !record.players.contains(&player_id) {
                record.players.push(player_id);
            }
        })
        .await
    }

    /// Record a player leaving
    pub async fn remove_player(&self, id: Uuid, player_id: Uuid) -> Result<(), StoreError> {
        self.mutate(id, |record| record.players.retain(|p| *p != player_id))
            .await
    }

    /// Delete the record at teardown
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.store.delete(&Self::key(id)).await
    }

    /// Append a match to the matchmaking queue
    pub async fn enqueue(&self, id: Uuid) -> Result<(), StoreError> {
        self.store
            .list_push_back(MATCH_QUEUE_KEY, &id.to_string())
            .await
    }

    /// Pop the front of the matchmaking queue
    ///
    /// Entries that no longer parse as ids are treated as absent.
    pub async fn pop_queue(&self) -> Result<Option<Uuid>, StoreError> {
        match self.store.list_pop_front(MATCH_QUEUE_KEY).await? {
            Some(raw) => Ok(raw.parse().ok()),
            None => Ok(None),
        }
    }

    async fn mutate<F>(&self, id: Uuid, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut MatchRecord),
    {
        let Some(mut record) = self.fetch(id).await? else {
            // Record already expired or deleted; nothing to update
            return Ok(());
        };
        apply(&mut record);
        let json = serde_json::to_string(&record)?;
        self.store
            .set(&Self::key(id), &json, Some(MATCH_RECORD_TTL))
            .await
    }
}
