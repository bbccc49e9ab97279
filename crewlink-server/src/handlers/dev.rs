//! Development utilities
//!
//! Mounted only when `dev_mode` is on. Identity normally comes from an
//! external provider; these endpoints mint sessions directly so a local
//! client or test harness can act as any customer or contractor.

use axum::{Json, extract::State, http::StatusCode};
use crewlink_model::{Actor, ActorRole, UserId};
use serde::Deserialize;
use tracing::warn;

use crate::{
    api::ApiResponse,
    infra::{
        app_state::AppState,
        errors::{AppError, AppResult},
        sessions::IssuedSession,
    },
};

#[derive(Debug, Deserialize)]
pub struct DevSessionRequest {
    pub role: ActorRole,
    /// Reuse an account id; a fresh one is generated when absent
    #[serde(default)]
    pub user_id: Option<UserId>,
}

pub async fn create_dev_session_handler(
    State(state): State<AppState>,
    Json(request): Json<DevSessionRequest>,
) -> AppResult<(StatusCode, ApiResponse<IssuedSession>)> {
    if !state.config.dev_mode {
        return Err(AppError::not_found("Not found"));
    }

    let actor = Actor {
        id: request.user_id.unwrap_or_else(UserId::new),
        role: request.role,
    };
    let session = state.sessions.issue(actor)?;
    warn!(actor_id = %actor.id, role = %actor.role, "development session minted");

    Ok((StatusCode::CREATED, ApiResponse::success(session)))
}
