use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use crewlink_core::domain::{
    QuoteDraft, SampleOutcome, TravelCredential, location::IssuedCode,
};
use crewlink_model::{
    Actor, Job, JobId, LocationSample, Quote, QuoteId, TravelStatus, WorkerId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    api::ApiResponse,
    infra::{app_state::AppState, errors::AppResult},
};

#[derive(Debug, Deserialize)]
pub struct WorkerSetRequest {
    #[serde(default)]
    pub worker_ids: Vec<WorkerId>,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct MeetingRequest {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ShareLocationRequest {
    pub worker_phone: String,
}

#[derive(Debug, Deserialize)]
pub struct LocationUpdateRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Reply to a location push. `accepted: false` means a newer sample was
/// already on record and this one was discarded.
#[derive(Debug, Serialize)]
pub struct LocationUpdateResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<LocationSample>,
}

impl From<SampleOutcome> for LocationUpdateResponse {
    fn from(outcome: SampleOutcome) -> Self {
        match outcome {
            SampleOutcome::Accepted(sample) => Self {
                accepted: true,
                sample: Some(sample),
            },
            SampleOutcome::Dropped => Self {
                accepted: false,
                sample: None,
            },
        }
    }
}

/// Claim a PENDING immediate or scheduled job
///
/// The body is optional; `worker_ids` defaults to an empty crew.
///
/// # Response
///
/// - `200 OK` with the ACCEPTED job
/// - `409 Conflict` when another contractor claimed it first
/// - `400 Bad Request` for BIDDING jobs or an oversized crew
pub async fn claim_job_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
    request: Option<Json<WorkerSetRequest>>,
) -> AppResult<ApiResponse<Job>> {
    let worker_ids = request
        .map(|Json(request)| request.worker_ids)
        .unwrap_or_default();
    let job = state.jobs.claim(job_id, &actor, worker_ids).await?;
    Ok(ApiResponse::success(job))
}

pub async fn assign_workers_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
    Json(request): Json<WorkerSetRequest>,
) -> AppResult<ApiResponse<Job>> {
    let job = state
        .jobs
        .assign_workers(job_id, &actor, request.worker_ids)
        .await?;
    Ok(ApiResponse::success(job))
}

/// Submit or revise this contractor's quote on a BIDDING job.
pub async fn submit_quote_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
    Json(draft): Json<QuoteDraft>,
) -> AppResult<(StatusCode, ApiResponse<Quote>)> {
    let quote = state.quotes.submit(job_id, &actor, draft).await?;
    Ok((StatusCode::CREATED, ApiResponse::success(quote)))
}

pub async fn delete_quote_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((job_id, quote_id)): Path<(JobId, QuoteId)>,
) -> AppResult<StatusCode> {
    state.quotes.cancel_quote(job_id, quote_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ask for an advance on the accepted quote, capped at 20% of its total.
pub async fn request_advance_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((job_id, quote_id)): Path<(JobId, QuoteId)>,
    Json(request): Json<AdvanceRequest>,
) -> AppResult<ApiResponse<Quote>> {
    let quote = state
        .quotes
        .request_advance(job_id, quote_id, &actor, request.amount)
        .await?;
    Ok(ApiResponse::success(quote))
}

pub async fn schedule_meeting_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((job_id, quote_id)): Path<(JobId, QuoteId)>,
    Json(request): Json<MeetingRequest>,
) -> AppResult<ApiResponse<Quote>> {
    let quote = state
        .quotes
        .schedule_meeting(job_id, quote_id, &actor, request.scheduled_at)
        .await?;
    Ok(ApiResponse::success(quote))
}

pub async fn start_job_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<ApiResponse<Job>> {
    let job = state.jobs.start(job_id, &actor).await?;
    Ok(ApiResponse::success(job))
}

pub async fn complete_job_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<ApiResponse<Job>> {
    let job = state.jobs.complete(job_id, &actor).await?;
    Ok(ApiResponse::success(job))
}

pub async fn contractor_cancel_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<ApiResponse<Job>> {
    let job = state.jobs.cancel(job_id, &actor).await?;
    Ok(ApiResponse::success(job))
}

pub async fn contractor_dispute_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<ApiResponse<Job>> {
    let job = state.jobs.dispute(job_id, &actor).await?;
    Ok(ApiResponse::success(job))
}

/// Issue a six-digit security code for a worker's phone
///
/// The code is returned once and must reach the worker out of band. It
/// expires after `LOCATION_CODE_TTL` and can be exchanged exactly once.
pub async fn share_location_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
    Json(request): Json<ShareLocationRequest>,
) -> AppResult<(StatusCode, ApiResponse<IssuedCode>)> {
    let issued = state
        .sharing
        .generate_code(job_id, &request.worker_phone, &actor)
        .await?;
    Ok((StatusCode::CREATED, ApiResponse::success(issued)))
}

pub async fn start_travel_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<ApiResponse<TravelStatus>> {
    let status = state
        .location
        .start_travel(job_id, &TravelCredential::Contractor(actor))
        .await?;
    Ok(ApiResponse::success(status))
}

pub async fn end_travel_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<StatusCode> {
    state
        .location
        .end_travel(job_id, &TravelCredential::Contractor(actor))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_location_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
    Json(request): Json<LocationUpdateRequest>,
) -> AppResult<ApiResponse<LocationUpdateResponse>> {
    let outcome = state
        .location
        .push_sample(
            job_id,
            &TravelCredential::Contractor(actor),
            request.latitude,
            request.longitude,
            request.recorded_at,
        )
        .await?;
    Ok(ApiResponse::success(outcome.into()))
}

pub async fn travel_status_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<ApiResponse<TravelStatus>> {
    let status = state.location.travel_status(job_id, &actor).await?;
    Ok(ApiResponse::success(status))
}
