use actix_web::web;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppSettings, PresenceConfig};
use crate::db::PresenceStore;
use crate::error::AppResult;
use crate::services::auth::JwtKeys;
use crate::services::{
    ChannelHub, CommandDispatcher, ConnectionLifecycleManager, EventRouter, LivenessSweep,
    PresenceRegistry,
};

/// Shared services, built once and cloned into every worker's `App`.
#[derive(Clone)]
pub struct AppState {
    pub keys: web::Data<JwtKeys>,
    pub presence: web::Data<PresenceConfig>,
    pub registry: Arc<PresenceRegistry>,
    pub channels: Arc<ChannelHub>,
    pub store: Arc<dyn PresenceStore>,
    pub lifecycle: web::Data<ConnectionLifecycleManager>,
    pub dispatcher: web::Data<CommandDispatcher>,
    pub router: web::Data<EventRouter>,
    pub sweep: web::Data<LivenessSweep>,
}

impl AppState {
    pub fn new(settings: &AppSettings, store: Arc<dyn PresenceStore>) -> AppResult<Self> {
        let keys = JwtKeys::from_secret(&settings.auth.jwt_secret, settings.auth.jwt_issuer.clone());
        Self::from_parts(keys, settings.presence.clone(), store)
    }

    pub fn from_parts(
        keys: JwtKeys,
        presence: PresenceConfig,
        store: Arc<dyn PresenceStore>,
    ) -> AppResult<Self> {
        let heartbeat_timeout = presence.heartbeat_timeout()?;
        let registry = Arc::new(PresenceRegistry::new());
        let channels = Arc::new(ChannelHub::new());

        let lifecycle = ConnectionLifecycleManager::new(
            keys.clone(),
            registry.clone(),
            channels.clone(),
            store.clone(),
        );
        let dispatcher = CommandDispatcher::new(registry.clone(), channels.clone());
        let router = EventRouter::new(channels.clone());
        let sweep = LivenessSweep::new(
            store.clone(),
            Duration::from_secs(presence.sweep_interval_secs),
            heartbeat_timeout,
        );

        Ok(Self {
            keys: web::Data::new(keys),
            presence: web::Data::new(presence),
            registry,
            channels,
            store,
            lifecycle: web::Data::new(lifecycle),
            dispatcher: web::Data::new(dispatcher),
            router: web::Data::new(router),
            sweep: web::Data::new(sweep),
        })
    }

    /// Register every service as app data.
    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.keys.clone())
            .app_data(self.presence.clone())
            .app_data(self.lifecycle.clone())
            .app_data(self.dispatcher.clone())
            .app_data(self.router.clone())
            .app_data(self.sweep.clone());
    }
}
