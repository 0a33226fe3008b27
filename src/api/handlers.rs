//! Callback and Launch Handlers
//!
//! The four provider callbacks delegate to the ledger engine; the
//! launch endpoint drives the session registry and fires the outbound
//! provider notification. Input validation happens here, before
//! delegation; every error answers `{success: false, error, code}`.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::server::SharedAppState;
use crate::ledger::LedgerError;
use crate::provider::ProviderLaunchRequest;
use crate::session::SessionError;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRequest {
    pub session_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitRequest {
    pub session_token: String,
    pub transaction_id: String,
    pub round_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRequest {
    pub session_token: String,
    pub transaction_id: String,
    pub round_id: String,
    pub amount: i64,
    #[serde(default)]
    pub related_transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    pub session_token: String,
    pub transaction_id: String,
    pub original_transaction_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchGameRequest {
    pub user_id: i64,
    pub game_id: i64,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub success: bool,
    pub balance: i64,
    pub currency: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchGameResponse {
    pub success: bool,
    pub session_id: i64,
    pub session_token: String,
    pub balance: i64,
    pub currency: String,
}

/// Error response shape shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: String,
}

/// Build a `{success: false, error, code}` response
pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = ErrorBody {
        success: false,
        error: message.to_string(),
        code: code.to_string(),
    };
    (status, Json(body)).into_response()
}

// =============================================================================
// Callback Handlers
// =============================================================================

/// POST /casino/getBalance
///
/// Read-only wallet lookup for a session. Never mutates state.
pub async fn handle_get_balance(State(state): State<SharedAppState>, body: Bytes) -> Response {
    let req: BalanceRequest = match parse_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if let Some(resp) = reject_empty_token(&req.session_token) {
        return resp;
    }

    match state.ledger.balance(&req.session_token) {
        Ok(wallet) => (
            StatusCode::OK,
            Json(BalanceResponse {
                success: true,
                balance: wallet.playable_balance,
                currency: wallet.currency,
            }),
        )
            .into_response(),
        Err(e) => ledger_error_response(e),
    }
}

/// POST /casino/debit
///
/// Debit a bet. Duplicate transaction ids replay the stored response.
pub async fn handle_debit(State(state): State<SharedAppState>, body: Bytes) -> Response {
    let req: DebitRequest = match parse_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if let Some(resp) = reject_empty_token(&req.session_token) {
        return resp;
    }

    match state
        .ledger
        .debit(&req.session_token, &req.transaction_id, &req.round_id, req.amount)
    {
        Ok(reply) => (StatusCode::OK, Json(reply.response)).into_response(),
        Err(e) => ledger_error_response(e),
    }
}

/// POST /casino/credit
///
/// Credit a payout. Zero amounts are legal and produce a real entry.
pub async fn handle_credit(State(state): State<SharedAppState>, body: Bytes) -> Response {
    let req: CreditRequest = match parse_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if let Some(resp) = reject_empty_token(&req.session_token) {
        return resp;
    }

    match state.ledger.credit(
        &req.session_token,
        &req.transaction_id,
        &req.round_id,
        req.amount,
        req.related_transaction_id.as_deref(),
    ) {
        Ok(reply) => (StatusCode::OK, Json(reply.response)).into_response(),
        Err(e) => ledger_error_response(e),
    }
}

/// POST /casino/rollback
///
/// Reverse a bet, record a tombstone for an unknown one, or replay.
pub async fn handle_rollback(State(state): State<SharedAppState>, body: Bytes) -> Response {
    let req: RollbackRequest = match parse_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if let Some(resp) = reject_empty_token(&req.session_token) {
        return resp;
    }

    match state.ledger.rollback(
        &req.session_token,
        &req.transaction_id,
        &req.original_transaction_id,
        req.reason.as_deref(),
    ) {
        Ok(reply) => (StatusCode::OK, Json(reply.response)).into_response(),
        Err(e) => ledger_error_response(e),
    }
}

// =============================================================================
// Launch and Health
// =============================================================================

/// POST /casino/launchGame
///
/// Front-end initiated: create the session, then tell the provider.
/// An outbound failure is logged and swallowed; the session stays
/// valid without a provider session id.
pub async fn handle_launch_game(State(state): State<SharedAppState>, body: Bytes) -> Response {
    let req: LaunchGameRequest = match parse_json(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let outcome = match state
        .sessions
        .launch(req.user_id, req.game_id, req.currency.as_deref())
    {
        Ok(outcome) => outcome,
        Err(e) => {
            let status = match &e {
                SessionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::NOT_FOUND,
            };
            return error_response(status, e.code(), &e.to_string());
        }
    };

    let launch_request = ProviderLaunchRequest {
        user_id: outcome.user.id,
        username: outcome.user.username.clone(),
        game_id: outcome.game.external_game_id.clone(),
        session_token: outcome.session.token.clone(),
        currency: outcome.wallet.currency.clone(),
        balance: outcome.wallet.playable_balance,
    };

    match state
        .notifier
        .notify_launch(&outcome.provider.api_url, &launch_request)
        .await
    {
        Ok(provider_session_id) => {
            if let Err(e) = state
                .sessions
                .attach_provider_session(outcome.session.id, &provider_session_id)
            {
                warn!(
                    target: "chipvault::api",
                    session_id = outcome.session.id,
                    error = %e,
                    "could not record provider session id"
                );
            }
        }
        Err(e) => {
            warn!(
                target: "chipvault::api",
                session_id = outcome.session.id,
                error = %e,
                "provider launch call failed, session stays valid"
            );
        }
    }

    (
        StatusCode::OK,
        Json(LaunchGameResponse {
            success: true,
            session_id: outcome.session.id,
            session_token: outcome.session.token,
            balance: outcome.wallet.playable_balance,
            currency: outcome.wallet.currency,
        }),
    )
        .into_response()
}

/// GET /api/health
///
/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chipvault",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_json<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(bytes).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            &format!("malformed request body: {}", e),
        )
    })
}

fn reject_empty_token(token: &str) -> Option<Response> {
    if token.is_empty() {
        return Some(error_response(
            StatusCode::UNAUTHORIZED,
            "INVALID_SESSION",
            "session missing or inactive",
        ));
    }
    None
}

fn ledger_error_response(err: LedgerError) -> Response {
    match &err {
        LedgerError::InvalidSession => {
            error_response(StatusCode::UNAUTHORIZED, err.code(), &err.to_string())
        }
        LedgerError::InvalidAmount(_)
        | LedgerError::InsufficientFunds { .. }
        | LedgerError::CannotRollbackPayout(_) => {
            error_response(StatusCode::BAD_REQUEST, err.code(), &err.to_string())
        }
        LedgerError::Storage(inner) => {
            error!(target: "chipvault::api", error = %inner, "storage failure in callback");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.code(),
                "internal error",
            )
        }
    }
}
