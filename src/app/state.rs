//! Application state shared across routes

use std::sync::Arc;

use crate::catalog::PassageCatalog;
use crate::config::Config;
use crate::game::MatchRegistry;
use crate::matchmaking::MatchmakingService;
use crate::store::{MatchStore, MemorySessionStore, PlayerStatsStore, SessionStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session_store: Arc<dyn SessionStore>,
    pub match_store: MatchStore,
    pub stats_store: PlayerStatsStore,
    pub matchmaking: Arc<MatchmakingService>,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config, catalog: PassageCatalog) -> Self {
        let config = Arc::new(config);

        // The in-process session-store adapter; the typed stores only see
        // the contract
        let session_store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

        let match_store = MatchStore::new(session_store.clone());
        let stats_store = PlayerStatsStore::new(session_store.clone());

        // Initialize match registry
        let match_registry = Arc::new(MatchRegistry::new());

        // Initialize matchmaking service (Arc for sharing across cloned AppState)
        let matchmaking = Arc::new(MatchmakingService::new(
            match_registry.clone(),
            match_store.clone(),
            stats_store.clone(),
            Arc::new(catalog),
        ));

        Self {
            config,
            session_store,
            match_store,
            stats_store,
            matchmaking,
            match_registry,
        }
    }
}
