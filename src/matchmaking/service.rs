//! Matchmaking service - match creation, the random-join queue, and the
//! stale-match reaper

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::PassageCatalog;
use crate::game::r#match::{GameMatch, MatchHandle, MatchRegistry};
use crate::game::{MatchCommand, PlayerCommand, MAX_PLAYERS_PER_MATCH, STALE_MATCH_SECS};
use crate::store::matches::MatchRecord;
use crate::store::{MatchStore, PlayerStatsStore, StoreError};
use crate::util::time::unix_millis;
use crate::ws::protocol::{MatchKind, MatchPhase};

use super::MAX_QUEUE_LOOKUPS;

/// Matchmaking service
pub struct MatchmakingService {
    registry: Arc<MatchRegistry>,
    match_store: MatchStore,
    stats_store: PlayerStatsStore,
    catalog: Arc<PassageCatalog>,
}

impl MatchmakingService {
    pub fn new(
        registry: Arc<MatchRegistry>,
        match_store: MatchStore,
        stats_store: PlayerStatsStore,
        catalog: Arc<PassageCatalog>,
    ) -> Self {
        Self {
            registry,
            match_store,
            stats_store,
            catalog,
        }
    }

    /// Create a match, register it, and spawn its coordinator
    pub async fn create_match(&self, kind: MatchKind) -> MatchHandle {
        let match_id = Uuid::new_v4();
        let round = self.catalog.draw();

        let (game_match, handle) = GameMatch::new(
            match_id,
            kind,
            round,
            self.match_store.clone(),
            self.stats_store.clone(),
        );

        self.registry.insert(handle.clone());

        // The in-memory handle stays authoritative if this write fails
        if let Err(e) = self
            .match_store
            .create(&MatchRecord::new(match_id, kind))
            .await
        {
            warn!(match_id = %match_id, error = %e, "Failed to persist match record");
        }

        info!(match_id = %match_id, kind = ?kind, "Created new match");

        // Run the coordinator; clean up registry and store when it exits
        let registry = self.registry.clone();
        let match_store = self.match_store.clone();
        tokio::spawn(async move {
            game_match.run().await;

            registry.remove(&match_id);
            if let Err(e) = match_store.delete(match_id).await {
                warn!(match_id = %match_id, error = %e, "Failed to delete match record");
            }

            info!(match_id = %match_id, "Match removed from registry");
        });

        handle
    }

    /// Find a joinable public match via the durable queue, creating one when
    /// the queue runs dry.
    ///
    /// Entries are popped before validation; a stale entry is dropped for
    /// good, a usable one is re-enqueued with a fresh push so later requests
    /// can still find it. Bounded so a queue full of finished matches cannot
    /// stall the request.
    pub async fn request_random_match(&self) -> Result<MatchHandle, StoreError> {
        for _ in 0..MAX_QUEUE_LOOKUPS {
            let Some(match_id) = self.match_store.pop_queue().await? else {
                break;
            };

            let Some(record) = self.match_store.fetch(match_id).await? else {
                continue; // match already gone
            };

            if !matches!(record.phase, MatchPhase::Lobby | MatchPhase::Countdown) {
                continue;
            }
            if record.players.is_empty() || record.players.len() >= MAX_PLAYERS_PER_MATCH {
                continue;
            }

            // The snapshot can lag the live match; require a live handle too
            let Some(handle) = self.registry.get(&match_id) else {
                continue;
            };

            self.match_store.enqueue(match_id).await?;
            return Ok(handle);
        }

        // Nothing usable: open a fresh public match and queue it
        let handle = self.create_match(MatchKind::PublicOpen).await;
        self.match_store.enqueue(handle.id).await?;
        Ok(handle)
    }

    /// Run the stale-match reaper
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let stale = self
                .registry
                .stale_handles(STALE_MATCH_SECS * 1000, unix_millis());

            for handle in stale {
                info!(match_id = %handle.id, "Reaping stale match");
                if handle
                    .cmd_tx
                    .send(PlayerCommand::internal(MatchCommand::Expire))
                    .await
                    .is_err()
                {
                    // Coordinator already gone; drop the registry entry
                    self.registry.remove(&handle.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogAuthor, CatalogEntry};
    use crate::store::MemorySessionStore;

    fn test_catalog() -> Arc<PassageCatalog> {
        let entries = vec![CatalogEntry {
            text: "ab cd".to_string(),
            author_name: "Ada".to_string(),
            author_handle: "ada".to_string(),
        }];
        let authors = vec![
            CatalogAuthor { name: "Ada".to_string(), handle: "ada".to_string() },
            CatalogAuthor { name: "Grace".to_string(), handle: "grace".to_string() },
            CatalogAuthor { name: "Edsger".to_string(), handle: "edsger".to_string() },
            CatalogAuthor { name: "Barbara".to_string(), handle: "barbara".to_string() },
        ];
        Arc::new(PassageCatalog::from_parts(entries, authors).unwrap())
    }

    fn service() -> (MatchmakingService, Arc<MatchRegistry>, MatchStore) {
        let store: Arc<MemorySessionStore> = Arc::new(MemorySessionStore::new());
        let registry = Arc::new(MatchRegistry::new());
        let match_store = MatchStore::new(store.clone());
        let service = MatchmakingService::new(
            registry.clone(),
            match_store.clone(),
            PlayerStatsStore::new(store),
            test_catalog(),
        );
        (service, registry, match_store)
    }

    #[tokio::test]
    async fn create_match_registers_and_persists() {
        let (service, registry, match_store) = service();

        let handle = service.create_match(MatchKind::PrivateInvite).await;
        assert!(registry.get(&handle.id).is_some());

        let record = match_store.fetch(handle.id).await.unwrap().unwrap();
        assert_eq!(record.kind, MatchKind::PrivateInvite);
        assert_eq!(record.phase, MatchPhase::Lobby);
    }

    #[tokio::test]
    async fn random_request_creates_when_queue_is_empty() {
        let (service, registry, match_store) = service();

        let handle = service.request_random_match().await.unwrap();
        assert_eq!(handle.kind, MatchKind::PublicOpen);
        assert!(registry.get(&handle.id).is_some());

        // The new match was queued for the next requester
        assert_eq!(match_store.pop_queue().await.unwrap(), Some(handle.id));
    }

    #[tokio::test]
    async fn random_request_reuses_a_joinable_match() {
        let (service, _registry, match_store) = service();

        let open = service.create_match(MatchKind::PublicOpen).await;
        match_store.add_player(open.id, Uuid::new_v4()).await.unwrap();
        match_store.enqueue(open.id).await.unwrap();

        let found = service.request_random_match().await.unwrap();
        assert_eq!(found.id, open.id);

        // The entry was re-enqueued, so the next request finds it again
        let found_again = service.request_random_match().await.unwrap();
        assert_eq!(found_again.id, open.id);
    }

    #[tokio::test]
    async fn random_request_discards_stale_entries() {
        let (service, _registry, match_store) = service();

        // A queue entry whose match record no longer exists
        match_store.enqueue(Uuid::new_v4()).await.unwrap();

        // An empty-roster match: not usable either
        let empty = service.create_match(MatchKind::PublicOpen).await;
        match_store.enqueue(empty.id).await.unwrap();

        // A started match: join window closed
        let started = service.create_match(MatchKind::PublicOpen).await;
        match_store.add_player(started.id, Uuid::new_v4()).await.unwrap();
        match_store
            .update_phase(started.id, MatchPhase::Active)
            .await
            .unwrap();
        match_store.enqueue(started.id).await.unwrap();

        let fresh = service.request_random_match().await.unwrap();
        assert_ne!(fresh.id, empty.id);
        assert_ne!(fresh.id, started.id);
        assert_eq!(fresh.kind, MatchKind::PublicOpen);
    }
}
