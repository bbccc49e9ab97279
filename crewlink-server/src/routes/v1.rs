use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::{
    handlers::{contractor, dev, jobs, notifications, websocket, worker},
    infra::{app_state::AppState, middleware::auth_middleware},
};

/// Create all v1 API routes
pub fn create_v1_router(state: AppState) -> Router<AppState> {
    let dev_mode = state.config.dev_mode;

    let router = Router::new()
        // Workers authenticate per request with their location token
        .route(
            "/worker/{job_id}/verify-location-code",
            post(worker::verify_location_code_handler),
        )
        .route("/worker/start-travel", post(worker::worker_start_travel_handler))
        .route("/worker/end-travel", post(worker::worker_end_travel_handler))
        .route(
            "/worker/update-location",
            post(worker::worker_update_location_handler),
        )
        .merge(create_protected_routes(state));

    if dev_mode {
        router.route("/dev/sessions", post(dev::create_dev_session_handler))
    } else {
        router
    }
}

/// Create protected routes that require a session
fn create_protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Shared
        .route("/jobs/active", get(jobs::active_job_handler))
        .route("/jobs/{id}", get(jobs::get_job_handler))
        .route("/jobs/{id}/quotes", get(jobs::list_quotes_handler))
        .route("/ws", get(websocket::websocket_handler))
        .route(
            "/notifications/unread-count",
            get(notifications::unread_count_handler),
        )
        .route(
            "/notifications/mark-all-read",
            put(notifications::mark_all_read_handler),
        )
        // Customer
        .route("/user/jobs", post(jobs::post_job_handler))
        .route("/user/jobs/{id}/cancel", post(jobs::customer_cancel_handler))
        .route("/user/jobs/{id}/dispute", post(jobs::customer_dispute_handler))
        .route(
            "/user/jobs/{id}/quotes/{quote_id}/accept",
            post(jobs::accept_quote_handler),
        )
        .route(
            "/user/jobs/{id}/advance-payment",
            post(jobs::advance_payment_handler),
        )
        // Contractor: lifecycle
        .route("/contractor/jobs/{id}/claim", post(contractor::claim_job_handler))
        .route(
            "/contractor/jobs/{id}/assign-workers",
            post(contractor::assign_workers_handler),
        )
        .route("/contractor/jobs/{id}/start", post(contractor::start_job_handler))
        .route(
            "/contractor/jobs/{id}/complete",
            post(contractor::complete_job_handler),
        )
        .route(
            "/contractor/jobs/{id}/cancel",
            post(contractor::contractor_cancel_handler),
        )
        .route(
            "/contractor/jobs/{id}/dispute",
            post(contractor::contractor_dispute_handler),
        )
        // Contractor: quotes
        .route(
            "/contractor/jobs/{id}/quotes",
            post(contractor::submit_quote_handler),
        )
        .route(
            "/contractor/jobs/{id}/quotes/{quote_id}",
            delete(contractor::delete_quote_handler),
        )
        .route(
            "/contractor/jobs/{id}/quotes/{quote_id}/request-advance",
            post(contractor::request_advance_handler),
        )
        .route(
            "/contractor/jobs/{id}/quotes/{quote_id}/meeting",
            post(contractor::schedule_meeting_handler),
        )
        // Contractor: location
        .route(
            "/contractor/jobs/{id}/share-location",
            post(contractor::share_location_handler),
        )
        .route(
            "/contractor/jobs/{id}/start-travel",
            post(contractor::start_travel_handler),
        )
        .route(
            "/contractor/jobs/{id}/end-travel",
            post(contractor::end_travel_handler),
        )
        .route(
            "/contractor/jobs/{id}/update-location",
            post(contractor::update_location_handler),
        )
        .route(
            "/contractor/jobs/{id}/travel-status",
            get(contractor::travel_status_handler),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
