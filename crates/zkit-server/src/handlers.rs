use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::client::ApiError;
use crate::registrar::RegistrarError;
use crate::AppState;

// ── Request bodies (camelCase, as the browser code sends them) ──────────────

#[derive(Debug, Deserialize)]
pub struct AliasRequest {
    pub alias: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishRegistrationRequest {
    pub user_id: String,
    pub reg_validation_verifier: String,
}

#[derive(Debug, Deserialize)]
pub struct IdRequest {
    pub id: String,
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// `POST /api/get-user-id` — alias → userId lookup.
pub async fn get_user_id(State(state): State<AppState>, Json(body): Json<AliasRequest>) -> Response {
    match state.registrar.user_id_for_alias(&body.alias) {
        Ok(user_id) => Json(json!({ "userId": user_id })).into_response(),
        Err(RegistrarError::UserNotFound) => {
            (StatusCode::NOT_FOUND, Json(json!("User not found"))).into_response()
        }
        Err(e) => registrar_error(e),
    }
}

/// `POST /api/init-user-reg` — phase 1 of registration. Returns only the
/// client-side part of the session; the verifier stays on this server.
pub async fn init_user_reg(
    State(state): State<AppState>,
    Json(body): Json<AliasRequest>,
) -> Response {
    match state.registrar.init_registration(&body.alias).await {
        Ok(pending) => Json(pending).into_response(),
        Err(e @ RegistrarError::AliasTaken(_)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => registrar_error(e),
    }
}

/// `POST /api/finished-registration` — phase 2: stores the validation
/// verifier and commits the registration on the tenant.
pub async fn finished_registration(
    State(state): State<AppState>,
    Json(body): Json<FinishRegistrationRequest>,
) -> Response {
    match state
        .registrar
        .finish_registration(&body.user_id, &body.reg_validation_verifier)
        .await
    {
        Ok(()) => Json(serde_json::Value::Null).into_response(),
        Err(RegistrarError::UserNotFound) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "type": "UserNotFound" })),
        )
            .into_response(),
        Err(e) => registrar_error(e),
    }
}

/// `POST /api/new-tresor` — commits a tresor created on the client side.
pub async fn new_tresor(State(state): State<AppState>, Json(body): Json<IdRequest>) -> Response {
    match state.registrar.create_tresor(&body.id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => registrar_error(e),
    }
}

/// `POST /api/shared-tresor` — commits a share and echoes the remote
/// response to the caller.
pub async fn shared_tresor(State(state): State<AppState>, Json(body): Json<IdRequest>) -> Response {
    match state.registrar.share_tresor(&body.id).await {
        Ok(echoed) => Json(echoed).into_response(),
        Err(e) => registrar_error(e),
    }
}

// ── Error mapping ─────────────────────────────────────────────────────────────

/// Remote rejections pass their status through; everything else collapses to
/// a gateway/internal error. Retry decisions stay with the caller.
fn registrar_error(e: RegistrarError) -> Response {
    match e {
        RegistrarError::Api(ApiError::Remote { status, body }) => {
            warn!(%status, "admin api rejected call");
            let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(json!({ "error": body }))).into_response()
        }
        RegistrarError::Api(e) => {
            error!(error = %e, "admin api call failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "admin api unreachable" })),
            )
                .into_response()
        }
        e => {
            error!(error = %e, "internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal server error" })),
            )
                .into_response()
        }
    }
}
