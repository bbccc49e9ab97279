use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use crewlink_model::{Actor, Job, JobId, NewJob, Quote, QuoteId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    api::ApiResponse,
    infra::{app_state::AppState, errors::AppResult},
};

#[derive(Debug, Deserialize)]
pub struct AdvancePaymentRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AcceptQuoteResponse {
    pub job: Job,
    pub quote: Quote,
    /// Sibling quotes moved to INVALIDATED by this acceptance
    pub invalidated: u64,
}

/// Post a new job
///
/// # Request
///
/// ```json
/// {
///   "title": "Fix the gate",
///   "job_type": "IMMEDIATE",
///   "workers_needed": 2,
///   "scheduled_start_date": null
/// }
/// ```
///
/// # Response
///
/// - `201 Created` with the PENDING job
/// - `400 Bad Request` for an empty title, zero workers or a SCHEDULED job
///   without a future start date
/// - `403 Forbidden` unless the caller is a customer
pub async fn post_job_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<NewJob>,
) -> AppResult<(StatusCode, ApiResponse<Job>)> {
    let job = state.jobs.post_job(&actor, request).await?;
    Ok((StatusCode::CREATED, ApiResponse::success(job)))
}

/// Fetch a job. Jobs still taking claims or quotes are visible to any
/// contractor; otherwise only the two parties may read it.
pub async fn get_job_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<ApiResponse<Job>> {
    let job = state.jobs.get_job(job_id, &actor).await?;
    Ok(ApiResponse::success(job))
}

/// The caller's current job, or `null` when there is none.
pub async fn active_job_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> AppResult<ApiResponse<Option<Job>>> {
    let job = state.jobs.active_job(&actor).await?;
    Ok(ApiResponse::success(job))
}

pub async fn customer_cancel_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<ApiResponse<Job>> {
    let job = state.jobs.cancel(job_id, &actor).await?;
    Ok(ApiResponse::success(job))
}

pub async fn customer_dispute_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<ApiResponse<Job>> {
    let job = state.jobs.dispute(job_id, &actor).await?;
    Ok(ApiResponse::success(job))
}

/// Quotes on a BIDDING job
///
/// The posting customer sees the quotes still in consideration; a
/// contractor sees only its own.
pub async fn list_quotes_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
) -> AppResult<ApiResponse<Vec<Quote>>> {
    let quotes = state.quotes.list_quotes(job_id, &actor).await?;
    Ok(ApiResponse::success(quotes))
}

/// Accept one quote. Every other quote on the job is invalidated in the
/// same step and the job moves to ACCEPTED with the quoting contractor.
pub async fn accept_quote_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((job_id, quote_id)): Path<(JobId, QuoteId)>,
) -> AppResult<ApiResponse<AcceptQuoteResponse>> {
    let accepted = state.quotes.accept(job_id, quote_id, &actor).await?;
    Ok(ApiResponse::success(AcceptQuoteResponse {
        job: accepted.job,
        quote: accepted.quote,
        invalidated: accepted.invalidated,
    }))
}

/// Record an advance the customer has paid against the accepted quote.
pub async fn advance_payment_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(job_id): Path<JobId>,
    Json(request): Json<AdvancePaymentRequest>,
) -> AppResult<ApiResponse<Job>> {
    let job = state
        .quotes
        .record_advance_payment(job_id, &actor, request.amount)
        .await?;
    Ok(ApiResponse::success(job))
}
