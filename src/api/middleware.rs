//! API Middleware - Provider Signature Gate
//!
//! Every provider callback must carry `x-provider-signature`: the
//! HMAC-SHA256 of the exact request body bytes under `PROVIDER_SECRET`.
//! The gate buffers the body, verifies the signature against those
//! bytes, and hands the untouched bytes on to the handler, so handler
//! and gate always see the same payload.
//!
//! Failure policy: a missing server-side secret is a configuration
//! error (HTTP 500); a missing, malformed, or mismatched signature is a
//! client error (HTTP 401, `SIGNATURE_INVALID`).

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use super::handlers::error_response;
use super::server::SharedAppState;
use crate::logging::{generate_correlation_id, log_security_event};
use crate::signature::{self, SignatureError, PROVIDER_SIGNATURE_HEADER};

/// Upper bound on a buffered callback body
const MAX_CALLBACK_BODY_BYTES: usize = 64 * 1024;

/// Verify the provider signature before the handler runs
pub async fn provider_signature_gate(
    State(state): State<SharedAppState>,
    request: Request,
    next: Next,
) -> Response {
    let correlation_id = generate_correlation_id();
    let path = request.uri().path().to_string();

    let Some(secret) = state.provider_secret.clone() else {
        log_security_event(
            "signature_gate_unconfigured",
            &path,
            &correlation_id,
            "PROVIDER_SECRET is not set",
        );
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "signature verification is not configured",
        );
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_CALLBACK_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                "request body unreadable or too large",
            )
        }
    };

    let result = match parts
        .headers
        .get(PROVIDER_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        None => Err(SignatureError::MissingHeader),
        Some(provided) => signature::verify(&secret, &bytes, provided),
    };

    if let Err(e) = result {
        log_security_event("signature_invalid", &path, &correlation_id, &e.to_string());
        return error_response(
            StatusCode::UNAUTHORIZED,
            "SIGNATURE_INVALID",
            "invalid request signature",
        );
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    next.run(request).await
}
