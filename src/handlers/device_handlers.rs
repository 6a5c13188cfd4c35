use actix_web::http::header::AUTHORIZATION;
use actix_web::{HttpRequest, HttpResponse, web};
use actix_web_actors::ws;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::PresenceConfig;
use crate::error::AppError;
use crate::models::AuthenticatedUser;
use crate::services::auth::extract_bearer;
use crate::services::device_link_ws::DeviceLinkWs;
use crate::services::{Connection, ConnectionLifecycleManager, EventRouter};

#[derive(Debug, Deserialize)]
pub struct WsConnectQuery {
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequestBody {
    pub status: Option<String>,
    pub current_video_id: Option<String>,
    pub playback_position: Option<f64>,
}

/// Upgrade to the device link socket. The credential comes from `?token=`
/// or an `Authorization: Bearer` header; a bad one is refused before upgrading.
pub async fn device_link_ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsConnectQuery>,
    lifecycle: web::Data<ConnectionLifecycleManager>,
    router: web::Data<EventRouter>,
    presence: web::Data<PresenceConfig>,
) -> Result<HttpResponse, actix_web::Error> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let credential = extract_bearer(query.token.as_deref(), header);

    let mut connection = Connection::connecting();
    let subject = lifecycle.authenticate(&mut connection, credential.as_deref())?;

    info!(
        connection_id = %connection.connection_id,
        subject_id = %subject.subject_id,
        "Starting device WebSocket connection"
    );

    let actor = DeviceLinkWs::new(connection, subject, lifecycle, router, &presence);
    ws::start(actor, &req, stream)
}

/// HTTP fallback for devices that poll instead of holding a socket.
pub async fn heartbeat_handler(
    lifecycle: web::Data<ConnectionLifecycleManager>,
    user: AuthenticatedUser,
    body: Option<web::Json<HeartbeatRequestBody>>,
) -> Result<HttpResponse, AppError> {
    user.require_device()?;

    let device_id = lifecycle.heartbeat_for_subject(&user.user_id).await?;
    let body = body.map(web::Json::into_inner).unwrap_or_default();

    debug!(
        user_id = %user.user_id,
        device_id = %device_id,
        status = ?body.status,
        current_video_id = ?body.current_video_id,
        playback_position = ?body.playback_position,
        "Device heartbeat received"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "received": true,
        "timestamp": Utc::now()
    })))
}
