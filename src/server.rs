//! Wiring of the hub, the match poller and the HTTP state

use log::info;
use tokio::task::JoinHandle;

use crate::auth::provider::SharedAuthenticator;
use crate::config::ServerConfig;
use crate::core::hub::{Hub, HubHandle};
use crate::core::poller::{MatchCache, MatchUpdatePoller};
use crate::handlers::AppState;
use crate::metrics::{HubMetrics, SharedMetrics};
use crate::storage::SharedStore;

/// Running background services of one server instance
pub struct Services {
    pub state: AppState,
    pub match_cache: MatchCache,
    pub metrics: SharedMetrics,
    pub hub_task: JoinHandle<()>,
    pub poller_task: Option<JoinHandle<()>>,
}

impl Services {
    pub fn hub(&self) -> &HubHandle {
        &self.state.hub
    }
}

/// Spawn the hub and, when enabled, the match update poller
pub fn start(config: &ServerConfig, store: SharedStore, authenticator: SharedAuthenticator) -> Services {
    let metrics = HubMetrics::shared();
    let match_cache = MatchCache::new();

    let (hub, handle) = Hub::new(
        store.clone(),
        match_cache.clone(),
        metrics.clone(),
        config.hub_settings(),
    );
    let hub_task = tokio::spawn(hub.run());

    let poller_task = if config.enable_match_updates {
        let poller = MatchUpdatePoller::new(
            store,
            match_cache.clone(),
            handle.broadcast_sender(),
            metrics.clone(),
            config.poller_settings(),
        );
        Some(tokio::spawn(poller.run()))
    } else {
        info!("Match updates disabled");
        None
    };

    let state = AppState::new(config, handle, authenticator, metrics.clone());

    Services {
        state,
        match_cache,
        metrics,
        hub_task,
        poller_task,
    }
}
