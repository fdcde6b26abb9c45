//! Player lifetime statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::session::{SessionStore, StoreError};
use super::PLAYER_PREFIX;

/// Durable per-player record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: Uuid,
    pub name: String,
    pub avg_speed: f64,
    pub best_speed: f64,
    pub avg_accuracy: f64,
    pub matches_played: u32,
    pub matches_won: u32,
    pub points: f64,
    /// Equipped cosmetic image link, if any
    pub cosmetic_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PlayerRecord {
    pub fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            avg_speed: 0.0,
            best_speed: 0.0,
            avg_accuracy: 0.0,
            matches_played: 0,
            matches_won: 0,
            points: 0.0,
            cosmetic_link: None,
            created_at: Utc::now(),
        }
    }
}

/// One finalized match, as folded into a player's record
#[derive(Debug, Clone, Copy)]
pub struct MatchResult {
    pub speed: f64,
    pub accuracy: f64,
    pub won: bool,
    pub points: f64,
}

/// Player stats store operations
#[derive(Clone)]
pub struct PlayerStatsStore {
    store: Arc<dyn SessionStore>,
}

impl PlayerStatsStore {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    fn key(id: Uuid) -> String {
        format!("{}{}", PLAYER_PREFIX, id)
    }

    /// Get a player record by id
    pub async fn fetch(&self, id: Uuid) -> Result<Option<PlayerRecord>, StoreError> {
        match self.store.get(&Self::key(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Get or create a record (ensures the record exists)
    pub async fn ensure(&self, id: Uuid, default_name: &str) -> Result<PlayerRecord, StoreError> {
        match self.fetch(id).await? {
            Some(record) => Ok(record),
            None => {
                let record = PlayerRecord::new(id, default_name);
                self.write(&record).await?;
                Ok(record)
            }
        }
    }

    /// Update a player's display name
    pub async fn rename(&self, id: Uuid, name: &str) -> Result<(), StoreError> {
        let mut record = self.ensure(id, name).await?;
        record.name = name.to_string();
        self.write(&record).await
    }

    /// Fold one finalized match into the player's running stats
    pub async fn record_result(
        &self,
        id: Uuid,
        name: &str,
        result: MatchResult,
    ) -> Result<(), StoreError> {
        let mut record = self.ensure(id, name).await?;

        let played = record.matches_played as f64;
        record.avg_accuracy += (result.accuracy - record.avg_accuracy) / (played + 1.0);
        record.avg_speed += (result.speed - record.avg_speed) / (played + 1.0);

        record.points += result.points;
        if result.speed > record.best_speed {
            record.best_speed = result.speed;
        }

        record.matches_played += 1;
        if result.won {
            record.matches_won += 1;
        }

        self.write(&record).await
    }

    async fn write(&self, record: &PlayerRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.store.set(&Self::key(record.id), &json, None).await
    }
}
