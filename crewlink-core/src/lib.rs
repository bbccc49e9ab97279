//! # Crewlink Core
//!
//! Business rules for the crewlink marketplace: the job lifecycle, quotes
//! and advances on bidding jobs, and the location-sharing flow that lets a
//! customer follow a contractor or worker travelling to a job.
//!
//! ## Overview
//!
//! - **Jobs**: [`domain::JobStateMachine`] owns every status transition and
//!   commits it through a compare-and-set on the stored job.
//! - **Quotes**: [`domain::QuoteLedger`] upserts quotes, accepts one per job
//!   and tracks the single advance a contractor may ask for.
//! - **Location sharing**: [`domain::LocationSharingService`] trades a
//!   six-digit code for a scoped worker token;
//!   [`domain::LocationBroadcastChannel`] relays positions from the one
//!   active traveler to the job room.
//! - **Session state**: [`domain::ActiveJobSynchronizer`] keeps an actor's
//!   "current job" view in a `watch` channel.
//! - **Storage**: ports in [`database::ports`], with an in-memory store and
//!   PostgreSQL adapters.
//!
//! ## Feature Flags
//!
//! - `database` (default): PostgreSQL adapters and embedded migrations
//! - `pg-tests`: integration tests against a live PostgreSQL server
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use crewlink_core::{
//!     database::InMemoryStore,
//!     domain::JobStateMachine,
//!     realtime::{Announcer, RoomHub},
//! };
//! use crewlink_model::{Actor, JobType, NewJob, UserId};
//!
//! async fn post_and_claim() -> Result<(), crewlink_core::error::DomainError> {
//!     let store = Arc::new(InMemoryStore::new());
//!     let announcer = Announcer::new(RoomHub::default(), store.clone());
//!     let jobs = JobStateMachine::new(store, announcer);
//!
//!     let customer = Actor::customer(UserId::new());
//!     let job = jobs
//!         .post_job(
//!             &customer,
//!             NewJob {
//!                 title: "Fix the gate".into(),
//!                 job_type: JobType::Immediate,
//!                 workers_needed: 1,
//!                 scheduled_start_date: None,
//!             },
//!         )
//!         .await?;
//!
//!     jobs.claim(job.id, &Actor::contractor(UserId::new()), vec![]).await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Keyed hashing and secret generation for codes and tokens
pub mod crypto;

/// Storage ports and their adapters
pub mod database;

/// Marketplace operations
pub mod domain;

/// Error types shared by storage and domain code
pub mod error;

/// Broadcast rooms and lifecycle announcements
pub mod realtime;

#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub use crypto::ShareCrypto;
pub use error::{DomainError, DomainResult, StoreError, StoreResult};
