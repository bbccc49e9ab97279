//! # Crewlink Server
//!
//! HTTP and WebSocket front end for the crewlink marketplace.
//!
//! ## Overview
//!
//! - **Jobs**: customers post work, contractors claim or bid on it, and
//!   both sides drive it through start, completion, cancellation or dispute
//! - **Bidding**: quotes, acceptance with sibling invalidation, and a single
//!   capped advance per accepted quote
//! - **Location sharing**: a contractor hands a worker a six-digit code;
//!   the worker trades it for a scoped token and streams positions that the
//!   customer follows live
//! - **Real time**: one WebSocket per session carrying lifecycle events,
//!   notifications and the caller's active job
//!
//! ## Architecture
//!
//! The server is built on Axum and uses:
//! - `crewlink-core` for every business rule
//! - PostgreSQL through `sqlx` when `DATABASE_URL` is set, otherwise an
//!   in-memory store
//! - `tokio::sync::broadcast` rooms for fan-out
//!
//! Identity is owned by an external provider. Requests carry an opaque
//! session bearer that [`infra::sessions::SessionDirectory`] resolves to an
//! actor; in `dev_mode`, `POST /api/v1/dev/sessions` mints one.

pub mod api;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
