use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::error::AppError;
use crate::models::{AuthenticatedUser, DevicePresenceRecord};
use crate::services::{
    CommandDispatcher, ConnectionLifecycleManager, DeliveryOutcome, LivenessSweep,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineClientsResponse {
    pub client_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPresenceResponse {
    pub client_id: String,
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<DevicePresenceRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub marked_offline: u64,
}

#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub delivered: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub data: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub event: String,
    #[serde(default)]
    pub data: JsonValue,
}

fn push_response(outcome: DeliveryOutcome) -> HttpResponse {
    HttpResponse::Ok().json(PushResponse {
        delivered: outcome.is_delivered(),
    })
}

pub async fn list_online_handler(
    user: AuthenticatedUser,
    dispatcher: web::Data<CommandDispatcher>,
) -> Result<HttpResponse, AppError> {
    user.require_observer()?;

    Ok(HttpResponse::Ok().json(OnlineClientsResponse {
        client_ids: dispatcher.list_online().into_iter().collect(),
    }))
}

pub async fn client_presence_handler(
    user: AuthenticatedUser,
    dispatcher: web::Data<CommandDispatcher>,
    lifecycle: web::Data<ConnectionLifecycleManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    user.require_observer()?;
    let client_id = path.into_inner();
    let record = lifecycle.store().get(&client_id).await?;

    Ok(HttpResponse::Ok().json(ClientPresenceResponse {
        is_online: dispatcher.is_online(&client_id),
        client_id,
        record,
    }))
}

pub async fn reconcile_handler(
    user: AuthenticatedUser,
    sweep: web::Data<LivenessSweep>,
) -> Result<HttpResponse, AppError> {
    user.require_observer()?;

    let marked_offline = sweep.manual_reconcile().await?;
    info!(
        user_id = %user.user_id,
        marked_offline = marked_offline,
        "Manual presence reconciliation finished"
    );

    Ok(HttpResponse::Ok().json(ReconcileResponse { marked_offline }))
}

pub async fn force_refresh_handler(
    user: AuthenticatedUser,
    dispatcher: web::Data<CommandDispatcher>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    user.require_observer()?;
    Ok(push_response(dispatcher.send_force_refresh(&path)))
}

pub async fn config_update_handler(
    user: AuthenticatedUser,
    dispatcher: web::Data<CommandDispatcher>,
    path: web::Path<String>,
    body: web::Json<JsonValue>,
) -> Result<HttpResponse, AppError> {
    user.require_observer()?;
    Ok(push_response(dispatcher.send_config_update(&path, body.into_inner())))
}

pub async fn sequence_update_handler(
    user: AuthenticatedUser,
    dispatcher: web::Data<CommandDispatcher>,
    path: web::Path<String>,
    body: web::Json<JsonValue>,
) -> Result<HttpResponse, AppError> {
    user.require_observer()?;
    Ok(push_response(dispatcher.send_sequence_update(&path, body.into_inner())))
}

pub async fn command_handler(
    user: AuthenticatedUser,
    dispatcher: web::Data<CommandDispatcher>,
    path: web::Path<String>,
    body: web::Json<CommandRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_observer()?;
    let CommandRequest { command, data } = body.into_inner();
    if command.trim().is_empty() {
        return Err(AppError::BadRequest("command must not be empty".to_string()));
    }

    Ok(push_response(dispatcher.send_command(&path, &command, data)))
}

pub async fn broadcast_handler(
    user: AuthenticatedUser,
    dispatcher: web::Data<CommandDispatcher>,
    body: web::Json<BroadcastRequest>,
) -> Result<HttpResponse, AppError> {
    user.require_observer()?;
    let BroadcastRequest { event, data } = body.into_inner();
    if event.trim().is_empty() {
        return Err(AppError::BadRequest("event must not be empty".to_string()));
    }

    Ok(HttpResponse::Ok().json(dispatcher.broadcast_event(&event, data)))
}
