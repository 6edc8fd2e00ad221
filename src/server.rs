//! REST endpoints: the Z-API webhook plus operator controls for pauses and
//! saved intakes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::channels::ZapiWebhook;
use crate::clock::Clock;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::flow::IntakeStatus;
use crate::store::{IntakeFilter, IntakeRepository};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub intakes: Arc<dyn IntakeRepository>,
}

/// Build the Axum router with the bot and intake routes.
pub fn bot_routes(dispatcher: Arc<Dispatcher>, intakes: Arc<dyn IntakeRepository>) -> Router {
    let state = AppState {
        dispatcher,
        intakes,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/bot/webhook", post(webhook))
        .route("/api/bot/paused-users", get(paused_users))
        .route("/api/bot/resume-user/{user_id}", post(resume_user))
        .route("/api/bot/status", get(status))
        .route("/api/intakes", get(list_intakes))
        .route("/api/intakes/stats", get(intake_stats))
        .route("/api/intakes/{id}/status", post(update_intake_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "intake-bot"
    }))
}

// ── Webhook ─────────────────────────────────────────────────────────────

/// Always answers 200 so the gateway does not redeliver; the body reports
/// whether the payload was handled.
async fn webhook(
    State(state): State<AppState>,
    Json(payload): Json<ZapiWebhook>,
) -> impl IntoResponse {
    if payload.is_api_echo() {
        debug!(phone = %payload.phone, "Echo of a message the bot sent, ignored");
        return Json(json!({ "success": true, "outcome": "ignored_echo" }));
    }

    let Some(event) = payload.into_event() else {
        warn!("Webhook without phone, ignored");
        return Json(json!({ "success": false, "message": "Dados de webhook inválidos" }));
    };

    // Operators take over with voice notes and stickers too, so only
    // customer messages need text.
    let is_customer = !event.is_from_operator && !event.is_group_chat;
    if is_customer && event.content.trim().is_empty() {
        debug!(user_id = %event.user_id, "Webhook without text content, ignored");
        return Json(json!({ "success": false, "message": "Mensagem sem conteúdo" }));
    }

    let outcome = state.dispatcher.dispatch(event).await;
    Json(json!({ "success": true, "outcome": outcome_label(&outcome) }))
}

fn outcome_label(outcome: &DispatchOutcome) -> &'static str {
    match outcome {
        DispatchOutcome::IgnoredGroup => "ignored_group",
        DispatchOutcome::Reactivated { .. } => "reactivated",
        DispatchOutcome::OperatorTakeover => "operator_takeover",
        DispatchOutcome::Suppressed { .. } => "paused",
        DispatchOutcome::Duplicate => "duplicate",
        DispatchOutcome::Replied { .. } => "replied",
        DispatchOutcome::Finalized { .. } => "finalized",
        DispatchOutcome::FinalizeFailed => "finalize_failed",
        DispatchOutcome::AiReplied { .. } => "ai_replied",
    }
}

// ── Pauses ──────────────────────────────────────────────────────────────

async fn paused_users(State(state): State<AppState>) -> impl IntoResponse {
    match state.dispatcher.pauses().list_active().await {
        Ok(users) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "total": users.len(),
                "pausedUsers": users,
            })),
        ),
        Err(e) => {
            error!(error = %e, "Failed to list paused users");
            internal_error(&e)
        }
    }
}

async fn resume_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match state.dispatcher.pauses().resume(&user_id).await {
        Ok(true) => {
            info!(user_id = %user_id, "Bot resumed via API");
            (
                StatusCode::OK,
                Json(json!({ "success": true, "message": "Bot reativado para este usuário" })),
            )
        }
        Ok(false) => (
            StatusCode::OK,
            Json(json!({ "success": false, "message": "Usuário não estava pausado" })),
        ),
        Err(e) => {
            error!(user_id = %user_id, error = %e, "Failed to resume user");
            internal_error(&e)
        }
    }
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.dispatcher.status().await;
    Json(json!({ "success": true, "status": status }))
}

// ── Intakes ─────────────────────────────────────────────────────────────

/// Services listed in the stats response.
const TOP_SERVICES: usize = 5;

#[derive(Debug, Deserialize)]
struct IntakeQuery {
    status: Option<String>,
    phone: Option<String>,
    limit: Option<usize>,
}

async fn list_intakes(
    State(state): State<AppState>,
    Query(query): Query<IntakeQuery>,
) -> impl IntoResponse {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match raw.parse::<IntakeStatus>() {
            Ok(status) => Some(status),
            Err(message) => return bad_request(&message),
        },
        None => None,
    };

    let filter = IntakeFilter {
        status,
        phone: query.phone.filter(|p| !p.trim().is_empty()),
        limit: query.limit,
    };
    match state.intakes.list_intakes(&filter).await {
        Ok(intakes) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "total": intakes.len(),
                "intakes": intakes,
            })),
        ),
        Err(e) => {
            error!(error = %e, "Failed to list intakes");
            internal_error(&e)
        }
    }
}

async fn intake_stats(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.dispatcher.clock().now();
    match state.intakes.intake_stats(now, TOP_SERVICES).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({ "success": true, "stats": stats })),
        ),
        Err(e) => {
            error!(error = %e, "Failed to compute intake stats");
            internal_error(&e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: String,
}

async fn update_intake_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> impl IntoResponse {
    let Ok(id) = id.parse::<i64>() else {
        return bad_request("Invalid intake ID");
    };
    let status = match body.status.parse::<IntakeStatus>() {
        Ok(status) => status,
        Err(message) => return bad_request(&message),
    };

    let now = state.dispatcher.clock().now();
    match state.intakes.update_intake_status(id, status, now).await {
        Ok(true) => {
            info!(intake_id = id, status = %status, "Intake status updated");
            (
                StatusCode::OK,
                Json(json!({ "success": true, "id": id, "status": status })),
            )
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Intake not found" })),
        ),
        Err(e) => {
            error!(intake_id = id, error = %e, "Failed to update intake status");
            internal_error(&e)
        }
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "message": message })),
    )
}

fn internal_error(e: &dyn std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "message": e.to_string() })),
    )
}
