use actix_web::web;

use crate::handlers;

/// Device-facing routes: the socket upgrade and the HTTP heartbeat.
pub fn configure_device_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/ws",
        web::get().to(handlers::device_handlers::device_link_ws_handler),
    );
    cfg.service(
        web::scope("/api/client") // Base path: /api/client
            .route("/heartbeat", web::post().to(handlers::device_handlers::heartbeat_handler)),
    );
}

/// Dashboard routes for presence queries and pushes (/api/presence/*).
pub fn configure_presence_routes(cfg: &mut web::ServiceConfig) {
    use handlers::presence_handlers as presence;

    cfg.service(
        web::scope("/api/presence")
            .route("/online", web::get().to(presence::list_online_handler))
            .route("/reconcile", web::post().to(presence::reconcile_handler))
            .route("/broadcast", web::post().to(presence::broadcast_handler))
            .service(
                web::scope("/clients/{client_id}")
                    .route("", web::get().to(presence::client_presence_handler))
                    .route("/force-refresh", web::post().to(presence::force_refresh_handler))
                    .route("/config", web::post().to(presence::config_update_handler))
                    .route("/sequence", web::post().to(presence::sequence_update_handler))
                    .route("/command", web::post().to(presence::command_handler)),
            ),
    );
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health::health_check));
    configure_device_routes(cfg);
    configure_presence_routes(cfg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PresenceConfig;
    use crate::db::{InMemoryPresenceStore, PresenceStore};
    use crate::services::auth::JwtKeys;
    use crate::services::test_support::{settle, spawn_recorder};
    use crate::state::AppState;
    use actix_web::{App, http::StatusCode, test};
    use chrono::Duration;
    use serde_json::{Value as JsonValue, json};
    use std::sync::Arc;

    fn state() -> (AppState, Arc<InMemoryPresenceStore>) {
        let store = Arc::new(InMemoryPresenceStore::new());
        store.add_device("screen-a", "device-user-a");
        let state = AppState::from_parts(
            JwtKeys::from_secret("routes-secret", None),
            PresenceConfig::default(),
            store.clone(),
        )
        .unwrap();
        (state, store)
    }

    fn bearer(state: &AppState, subject: &str, role: &str) -> (&'static str, String) {
        let token = state
            .keys
            .create_token(subject, role, Duration::hours(1))
            .unwrap();
        ("Authorization", format!("Bearer {}", token))
    }

    #[actix_rt::test]
    async fn test_health() {
        let (state, _) = state();
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.register(cfg))
                .configure(configure_routes),
        )
        .await;

        let body: JsonValue =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(body["status"], "ok");
    }

    #[actix_rt::test]
    async fn test_presence_routes_require_observer_token() {
        let (state, _) = state();
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.register(cfg))
                .configure(configure_routes),
        )
        .await;

        let anonymous = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/presence/online").to_request(),
        )
        .await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let device = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/api/presence/online")
                .insert_header(bearer(&state, "device-user-a", "CLIENT"))
                .to_request(),
        )
        .await;
        assert_eq!(device.status(), StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn test_online_list_and_force_refresh() {
        let (state, _) = state();
        let socket = spawn_recorder();
        let device = state
            .keys
            .validate(&state.keys.create_token("device-user-a", "CLIENT", Duration::hours(1)).unwrap())
            .unwrap();
        state.lifecycle.activate(&device, socket.handle.clone()).await.unwrap();
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.register(cfg))
                .configure(configure_routes),
        )
        .await;

        let online: JsonValue = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/presence/online")
                .insert_header(bearer(&state, "admin-1", "ADMIN"))
                .to_request(),
        )
        .await;
        assert_eq!(online, json!({"clientIds": ["screen-a"]}));

        let pushed: JsonValue = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri("/api/presence/clients/screen-a/force-refresh")
                .insert_header(bearer(&state, "admin-1", "ADMIN"))
                .to_request(),
        )
        .await;
        assert_eq!(pushed, json!({"delivered": true}));

        let missed: JsonValue = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri("/api/presence/clients/ghost/force-refresh")
                .insert_header(bearer(&state, "admin-1", "ADMIN"))
                .to_request(),
        )
        .await;
        assert_eq!(missed, json!({"delivered": false}));

        settle().await;
        assert_eq!(socket.frames(), vec![json!({"type": "client:force-refresh"})]);
    }

    #[actix_rt::test]
    async fn test_client_presence_and_reconcile() {
        let (state, store) = state();
        store.set_record(crate::models::DevicePresenceRecord {
            device_id: "screen-a".into(),
            is_online: true,
            last_seen: Some(chrono::Utc::now() - Duration::minutes(10)),
        });
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.register(cfg))
                .configure(configure_routes),
        )
        .await;

        let status: JsonValue = test::call_and_read_body_json(
            &app,
            test::TestRequest::get()
                .uri("/api/presence/clients/screen-a")
                .insert_header(bearer(&state, "admin-1", "ADMIN"))
                .to_request(),
        )
        .await;
        assert_eq!(status["clientId"], "screen-a");
        assert_eq!(status["isOnline"], false);
        assert_eq!(status["record"]["isOnline"], true);

        let reconciled: JsonValue = test::call_and_read_body_json(
            &app,
            test::TestRequest::post()
                .uri("/api/presence/reconcile")
                .insert_header(bearer(&state, "admin-1", "ADMIN"))
                .to_request(),
        )
        .await;
        assert_eq!(reconciled, json!({"markedOffline": 1}));
    }

    #[actix_rt::test]
    async fn test_http_heartbeat_refreshes_record() {
        let (state, store) = state();
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.register(cfg))
                .configure(configure_routes),
        )
        .await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/client/heartbeat")
                .insert_header(bearer(&state, "device-user-a", "CLIENT"))
                .set_json(json!({"status": "playing", "currentVideoId": "v-1"}))
                .to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.get("screen-a").await.unwrap().unwrap().is_online);
    }

    #[actix_rt::test]
    async fn test_ws_upgrade_without_token_is_unauthorized() {
        let (state, _) = state();
        let app = test::init_service(
            App::new()
                .configure(|cfg| state.register(cfg))
                .configure(configure_routes),
        )
        .await;

        let response = test::call_service(
            &app,
            test::TestRequest::get().uri("/ws").to_request(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(state.registry.is_empty());
    }
}
