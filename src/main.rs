use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Logger};
use anyhow::Context;
use dotenv::dotenv;
use std::net::TcpListener;
use std::sync::Arc;

use signage_presence_server::config::{self, AppSettings, PresenceStoreKind};
use signage_presence_server::db::{
    InMemoryPresenceStore, PgPresenceStore, PresenceStore, create_pool, verify_connection,
};
use signage_presence_server::logging::init_logging;
use signage_presence_server::routes::configure_routes;
use signage_presence_server::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let app_settings = config::init_config().context("Failed to load application settings")?;
    init_logging(&app_settings.logging.level).context("Failed to initialize logging")?;

    log::info!(
        "Starting {} ({})",
        app_settings.app.name,
        app_settings.app.environment
    );

    let store = build_presence_store(&app_settings).await?;
    let state = AppState::new(&app_settings, store).context("Failed to build application state")?;

    let sweep_task = state.sweep.clone().into_inner().start();

    let server_addr = format!("{}:{}", app_settings.server.host, app_settings.server.port);
    let listener = TcpListener::bind(&server_addr)
        .with_context(|| format!("Failed to bind {}", server_addr))?;
    log::info!("Starting server at http://{}", server_addr);

    let cors_origins = app_settings.server.cors_origins.clone();
    let result = HttpServer::new(move || {
        let mut cors = Cors::default();
        if cors_origins.iter().any(|origin| origin == "*") {
            cors = cors.allow_any_origin();
        } else {
            for origin in &cors_origins {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors.allow_any_method().allow_any_header();

        let state = state.clone();
        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .configure(move |cfg| state.register(cfg))
            .configure(configure_routes)
    })
    .listen(listener)?
    .run()
    .await;

    sweep_task.abort();
    log::info!("Server stopped");
    result.context("HTTP server terminated with an error")
}

async fn build_presence_store(settings: &AppSettings) -> anyhow::Result<Arc<dyn PresenceStore>> {
    match settings.database.store {
        PresenceStoreKind::Memory => {
            log::warn!("Using in-memory presence store; presence will not survive restarts");
            let devices = &settings.database.memory_devices;
            if devices.is_empty() {
                log::warn!("MEMORY_DEVICES is empty; every device connection will fail activation");
            } else {
                log::info!("Provisioned {} in-memory device(s)", devices.len());
            }
            Ok(Arc::new(InMemoryPresenceStore::with_devices(devices)))
        }
        PresenceStoreKind::Postgres => {
            let url = settings
                .database
                .url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres presence store")?;
            let pool = create_pool(url).await?;
            verify_connection(&pool).await?;
            log::info!("Database connection established successfully");
            Ok(Arc::new(PgPresenceStore::new(Arc::new(pool))))
        }
    }
}
