use axum::{Extension, extract::State};
use crewlink_model::Actor;
use serde::Serialize;

use crate::{
    api::ApiResponse,
    infra::{app_state::AppState, errors::AppResult},
};

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: u64,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked: u64,
}

pub async fn unread_count_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> AppResult<ApiResponse<UnreadCountResponse>> {
    let unread = state.repositories.notifications.unread_count(actor.id).await?;
    Ok(ApiResponse::success(UnreadCountResponse { unread }))
}

pub async fn mark_all_read_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> AppResult<ApiResponse<MarkReadResponse>> {
    let marked = state.announcer.mark_all_read(actor.id).await?;
    tracing::debug!(actor_id = %actor.id, marked, "notifications marked read");
    Ok(ApiResponse::success(MarkReadResponse { marked }))
}
