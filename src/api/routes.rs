//! REST endpoints for RFPs, vendors, dispatch, and proposal comparison.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::future::join_all;
use serde::Deserialize;
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::error::DatabaseError;
use crate::model::NewVendor;
use crate::outbound::Mailer;
use crate::pipeline::ingest::{self, ReplyOutcome};
use crate::pipeline::{draft, score};
use crate::store::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<dyn Database>,
    /// Outbound mailer (None when SMTP is not configured).
    pub mailer: Option<Arc<Mailer>>,
    /// Wakes the ingestion loop for an immediate poll after a dispatch.
    pub wake: Arc<Notify>,
}

/// Build the Axum router with the full REST surface.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/rfps", get(list_rfps).post(create_rfp))
        .route("/api/rfps/{id}", get(get_rfp))
        .route("/api/rfps/{id}/send", post(send_rfp))
        .route("/api/rfps/{id}/simulate-reply", post(simulate_reply))
        .route("/api/rfps/{id}/compare", get(compare_proposals))
        .route("/api/vendors", get(list_vendors).post(create_vendor))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn storage_error(context: &str, e: DatabaseError) -> Response {
    error!("{context}: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "storage failure"})),
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": format!("No such {what}")})),
    )
        .into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "rfp-desk"
    }))
}

// ── RFPs ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DraftRequest {
    text: String,
}

/// POST /api/rfps
///
/// Drafts an RFP from a free-text description and persists it.
async fn create_rfp(
    State(state): State<ApiState>,
    Json(body): Json<DraftRequest>,
) -> impl IntoResponse {
    let draft = draft::draft_rfp(&body.text);
    match state.db.create_rfp(draft).await {
        Ok(rfp) => {
            info!(rfp_id = rfp.id, title = %rfp.title, "RFP drafted");
            (StatusCode::CREATED, Json(serde_json::json!(rfp))).into_response()
        }
        Err(e) => storage_error("create_rfp", e),
    }
}

async fn list_rfps(State(state): State<ApiState>) -> impl IntoResponse {
    match state.db.list_rfps().await {
        Ok(rfps) => Json(rfps).into_response(),
        Err(e) => storage_error("list_rfps", e),
    }
}

async fn get_rfp(State(state): State<ApiState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.db.get_rfp(id).await {
        Ok(Some(rfp)) => Json(rfp).into_response(),
        Ok(None) => not_found("RFP"),
        Err(e) => storage_error("get_rfp", e),
    }
}

// ── Dispatch ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SendRequest {
    vendor_ids: Vec<i64>,
}

/// POST /api/rfps/{id}/send
///
/// Emails the RFP to the given vendors and records who got it. Per-vendor
/// failures do not abort the batch; the response lists both sides.
async fn send_rfp(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<SendRequest>,
) -> impl IntoResponse {
    let Some(mailer) = state.mailer.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "Outbound mail is not configured"})),
        )
            .into_response();
    };

    let rfp = match state.db.get_rfp(id).await {
        Ok(Some(rfp)) => rfp,
        Ok(None) => return not_found("RFP"),
        Err(e) => return storage_error("send_rfp", e),
    };

    // One blocking send per vendor, all in flight at once.
    let sends: Vec<_> = body
        .vendor_ids
        .iter()
        .map(|&vendor_id| {
            let db = Arc::clone(&state.db);
            let mailer = Arc::clone(&mailer);
            let rfp = rfp.clone();
            async move {
                let vendor = match db.get_vendor(vendor_id).await {
                    Ok(Some(v)) => v,
                    Ok(None) => {
                        warn!(rfp_id = rfp.id, vendor_id, "skipping unknown vendor");
                        return (vendor_id, false);
                    }
                    Err(e) => {
                        error!(vendor_id, "vendor lookup failed: {e}");
                        return (vendor_id, false);
                    }
                };
                let rfp_id = rfp.id;
                match tokio::task::spawn_blocking(move || mailer.send_rfp(&rfp, &vendor)).await {
                    Ok(Ok(())) => (vendor_id, true),
                    Ok(Err(e)) => {
                        error!(rfp_id, vendor_id, "RFP dispatch failed: {e}");
                        (vendor_id, false)
                    }
                    Err(e) => {
                        error!(rfp_id, vendor_id, "RFP dispatch task died: {e}");
                        (vendor_id, false)
                    }
                }
            }
        })
        .collect();

    let mut sent = Vec::new();
    let mut failed = Vec::new();
    for (vendor_id, ok) in join_all(sends).await {
        if ok {
            sent.push(vendor_id);
        } else {
            failed.push(vendor_id);
        }
    }

    // Selected vendors accumulate across dispatches.
    let mut selected = rfp.selected_vendors.clone();
    for vendor_id in &sent {
        if !selected.contains(vendor_id) {
            selected.push(*vendor_id);
        }
    }
    if let Err(e) = state.db.set_rfp_vendors(id, &selected).await {
        return storage_error("send_rfp", e);
    }

    // Replies can only show up after a dispatch; poke the ingestion loop.
    if !sent.is_empty() {
        state.wake.notify_one();
    }

    Json(serde_json::json!({"rfp_id": id, "sent": sent, "failed": failed})).into_response()
}

// ── Replies ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SimulatedReply {
    #[serde(default)]
    vendor_email: Option<String>,
    body: String,
}

/// POST /api/rfps/{id}/simulate-reply
///
/// Runs the reply pipeline on a pasted body, skipping the mailbox. The
/// same extraction, duplicate filter, and scoring apply, so demos and
/// tests exercise the real path.
async fn simulate_reply(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<SimulatedReply>,
) -> impl IntoResponse {
    match state.db.get_rfp(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("RFP"),
        Err(e) => return storage_error("simulate_reply", e),
    }

    // Same vendor resolution as mailbox ingestion: known addresses are
    // recorded under their vendor id, anything else under the raw string.
    let sender = body
        .vendor_email
        .unwrap_or_else(|| "simulated@localhost".to_string());
    let vendor = match state.db.find_vendor_by_email(&sender).await {
        Ok(Some(v)) => v.id.to_string(),
        Ok(None) => sender,
        Err(e) => return storage_error("simulate_reply", e),
    };

    match ingest::ingest_reply(state.db.as_ref(), id, &vendor, &body.body).await {
        Ok(ReplyOutcome::Stored(proposal)) => {
            info!(
                rfp_id = id,
                vendor = %proposal.vendor,
                score = proposal.score,
                "simulated reply stored"
            );
            (StatusCode::CREATED, Json(serde_json::json!(proposal))).into_response()
        }
        Ok(ReplyOutcome::Duplicate) => {
            Json(serde_json::json!({"duplicate": true})).into_response()
        }
        Err(e) => storage_error("simulate_reply", e),
    }
}

/// GET /api/rfps/{id}/compare
///
/// Proposals for one RFP sorted best-first, with the winner called out.
/// Ties on score go to the earlier reply.
async fn compare_proposals(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let rfp = match state.db.get_rfp(id).await {
        Ok(Some(rfp)) => rfp,
        Ok(None) => return not_found("RFP"),
        Err(e) => return storage_error("compare_proposals", e),
    };

    let mut proposals = match state.db.proposals_for_rfp(id).await {
        Ok(list) => list,
        Err(e) => return storage_error("compare_proposals", e),
    };
    proposals.sort_by(score::compare_order);
    let best_id = score::best_proposal(&proposals).map(|p| p.id);

    Json(serde_json::json!({
        "rfp_id": id,
        "budget": rfp.budget,
        "best_proposal_id": best_id,
        "proposals": proposals,
    }))
    .into_response()
}

// ── Vendors ─────────────────────────────────────────────────────────────

/// POST /api/vendors
async fn create_vendor(
    State(state): State<ApiState>,
    Json(body): Json<NewVendor>,
) -> impl IntoResponse {
    if body.name.trim().is_empty() || body.email.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "name and email are required"})),
        )
            .into_response();
    }

    match state.db.create_vendor(body).await {
        Ok(vendor) => {
            info!(vendor_id = vendor.id, email = %vendor.email, "vendor registered");
            (StatusCode::CREATED, Json(serde_json::json!(vendor))).into_response()
        }
        Err(DatabaseError::Constraint(message)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": message})),
        )
            .into_response(),
        Err(e) => storage_error("create_vendor", e),
    }
}

async fn list_vendors(State(state): State<ApiState>) -> impl IntoResponse {
    match state.db.list_vendors().await {
        Ok(vendors) => Json(vendors).into_response(),
        Err(e) => storage_error("list_vendors", e),
    }
}
