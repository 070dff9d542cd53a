//! HTTP request handlers

use super::AppState;
use crate::error::{SessiondError, SessiondResult};
use crate::journal::InboxEntry;
use crate::session::SessionSnapshot;
use crate::tenant::TenantId;
use crate::transport::SendReceipt;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// Default and maximum number of inbox entries returned
const MESSAGES_DEFAULT_LIMIT: usize = 50;
const MESSAGES_MAX_LIMIT: usize = 500;

/// Build all routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{tenant}/status", get(status))
        .route("/sessions/{tenant}/qr", get(qr))
        .route("/sessions/{tenant}/start", post(start))
        .route("/sessions/{tenant}/logout", post(logout))
        .route("/sessions/{tenant}/send", post(send))
        .route("/sessions/{tenant}/messages", get(messages))
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    tenants: usize,
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
}

#[derive(Debug, Serialize)]
struct Sent {
    ok: bool,
    result: SendReceipt,
}

#[derive(Debug, Serialize)]
struct Qr {
    qr: Option<String>,
}

#[derive(Debug, Serialize)]
struct Sessions {
    sessions: Vec<SessionSnapshot>,
}

#[derive(Debug, Serialize)]
struct Messages {
    messages: Vec<InboxEntry>,
}

/// Body of `POST /sessions/{tenant}/send`
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
}

fn parse_tenant(raw: &str) -> SessiondResult<TenantId> {
    TenantId::parse(raw)
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tenants: state.registry.len(),
    })
}

async fn list_sessions(State(state): State<AppState>) -> Json<Sessions> {
    Json(Sessions {
        sessions: state.registry.snapshots(),
    })
}

// Reads never create a supervisor; unknown tenants are idle
async fn status(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> SessiondResult<Json<SessionSnapshot>> {
    let tenant = parse_tenant(&raw)?;
    Ok(Json(state.registry.status(&tenant)))
}

async fn qr(State(state): State<AppState>, Path(raw): Path<String>) -> SessiondResult<Json<Qr>> {
    let tenant = parse_tenant(&raw)?;
    let qr = state.registry.get(&tenant).and_then(|s| s.qr());
    Ok(Json(Qr { qr }))
}

async fn start(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> SessiondResult<Json<SessionSnapshot>> {
    let tenant = parse_tenant(&raw)?;
    let snapshot = state.registry.ensure(&tenant).start().await?;
    Ok(Json(snapshot))
}

async fn logout(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> SessiondResult<Json<Ack>> {
    let tenant = parse_tenant(&raw)?;
    state.registry.ensure(&tenant).logout().await?;
    Ok(Json(Ack { ok: true }))
}

async fn send(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> SessiondResult<Json<Sent>> {
    let tenant = parse_tenant(&raw)?;
    let Json(request) = body.map_err(|e| SessiondError::BadRequest(e.body_text()))?;
    let to = request.to.ok_or(SessiondError::MissingField("to"))?;
    let text = request.text.ok_or(SessiondError::MissingField("text"))?;

    let result = state.registry.ensure(&tenant).send_text(&to, &text).await?;
    Ok(Json(Sent { ok: true, result }))
}

async fn messages(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> SessiondResult<Json<Messages>> {
    let tenant = parse_tenant(&raw)?;
    let limit = query
        .limit
        .unwrap_or(MESSAGES_DEFAULT_LIMIT)
        .min(MESSAGES_MAX_LIMIT);

    let messages = match &state.inbox {
        Some(inbox) => inbox.recent(&tenant, limit).await?,
        None => Vec::new(),
    };
    Ok(Json(Messages { messages }))
}
