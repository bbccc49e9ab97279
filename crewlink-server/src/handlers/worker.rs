//! Endpoints for workers, who hold no account. A worker exchanges the
//! security code for a scoped token and then presents that token as its
//! bearer; the job comes from the token, not the path.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use crewlink_core::domain::{TravelCredential, location::IssuedToken};
use crewlink_model::{JobId, LocationCapability, TravelStatus};
use serde::Deserialize;

use super::contractor::{LocationUpdateRequest, LocationUpdateResponse};
use crate::{
    api::ApiResponse,
    infra::{app_state::AppState, errors::AppResult, middleware::WorkerBearer},
};

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub security_code: String,
    pub worker_phone: String,
}

/// Exchange a security code for a location token
///
/// # Request
///
/// ```json
/// { "security_code": "042917", "worker_phone": "+15551234567" }
/// ```
///
/// # Response
///
/// - `200 OK` with `{ token, job_id, capabilities, expires_at }`
/// - `400 Bad Request` for a malformed code or phone
/// - `404 Not Found` when no code was issued for this job and phone
/// - `409 Conflict` when the code was already exchanged
/// - `410 Gone` when the code expired
/// - `422 Unprocessable Entity` for a wrong code
pub async fn verify_location_code_handler(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(request): Json<VerifyCodeRequest>,
) -> AppResult<ApiResponse<IssuedToken>> {
    let issued = state
        .sharing
        .verify_code(job_id, &request.security_code, &request.worker_phone)
        .await?;
    Ok(ApiResponse::success(issued))
}

async fn credential(
    state: &AppState,
    bearer: &WorkerBearer,
    capability: LocationCapability,
) -> AppResult<(JobId, TravelCredential)> {
    let scope = state.sharing.authorize(&bearer.0, capability).await?;
    Ok((scope.job_id, TravelCredential::Worker(scope)))
}

pub async fn worker_start_travel_handler(
    State(state): State<AppState>,
    bearer: WorkerBearer,
) -> AppResult<ApiResponse<TravelStatus>> {
    let (job_id, credential) =
        credential(&state, &bearer, LocationCapability::StartTravel).await?;
    let status = state.location.start_travel(job_id, &credential).await?;
    Ok(ApiResponse::success(status))
}

pub async fn worker_end_travel_handler(
    State(state): State<AppState>,
    bearer: WorkerBearer,
) -> AppResult<StatusCode> {
    let (job_id, credential) =
        credential(&state, &bearer, LocationCapability::EndTravel).await?;
    state.location.end_travel(job_id, &credential).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn worker_update_location_handler(
    State(state): State<AppState>,
    bearer: WorkerBearer,
    Json(request): Json<LocationUpdateRequest>,
) -> AppResult<ApiResponse<LocationUpdateResponse>> {
    let (job_id, credential) =
        credential(&state, &bearer, LocationCapability::UpdateLocation).await?;
    let outcome = state
        .location
        .push_sample(
            job_id,
            &credential,
            request.latitude,
            request.longitude,
            request.recorded_at,
        )
        .await?;
    Ok(ApiResponse::success(outcome.into()))
}
