#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use crewlink_core::{
    ShareCrypto,
    database::Repositories,
    domain::{
        JobStateMachine, LocationBroadcastChannel, LocationSharingService, QuoteDraft, QuoteLedger,
    },
    realtime::{Announcer, RoomHub},
};
use crewlink_model::{Actor, Job, JobType, NewJob, UserId};
use rust_decimal::Decimal;

pub const SHARE_KEY: &str = "integration-test-key";

/// Every marketplace service wired over one set of repositories, the way
/// the server assembles them.
pub struct Marketplace {
    pub repos: Repositories,
    pub hub: RoomHub,
    pub jobs: JobStateMachine,
    pub quotes: QuoteLedger,
    pub sharing: LocationSharingService,
    pub location: LocationBroadcastChannel,
}

impl Marketplace {
    pub fn in_memory() -> Self {
        Self::with_repositories(Repositories::in_memory())
    }

    pub fn with_repositories(repos: Repositories) -> Self {
        let hub = RoomHub::new(64);
        let announcer = Announcer::new(hub.clone(), repos.notifications.clone());
        let location =
            LocationBroadcastChannel::new(repos.jobs.clone(), repos.samples.clone(), hub.clone());
        let jobs = JobStateMachine::new(repos.jobs.clone(), announcer.clone())
            .with_listener(Arc::new(location.clone()));
        let quotes = QuoteLedger::new(repos.jobs.clone(), repos.quotes.clone(), announcer);
        let crypto = Arc::new(ShareCrypto::new(SHARE_KEY).expect("non-empty key"));
        let sharing = LocationSharingService::new(
            repos.jobs.clone(),
            repos.grants.clone(),
            repos.tokens.clone(),
            crypto,
        );

        Self {
            repos,
            hub,
            jobs,
            quotes,
            sharing,
            location,
        }
    }

    pub async fn post(&self, customer: &Actor, job_type: JobType) -> Result<Job> {
        let scheduled_start_date = match job_type {
            JobType::Scheduled => Some(Utc::now() + Duration::days(2)),
            _ => None,
        };
        self.jobs
            .post_job(
                customer,
                NewJob {
                    title: format!("{job_type} job"),
                    job_type,
                    workers_needed: 3,
                    scheduled_start_date,
                },
            )
            .await
            .context("posting job")
    }

    /// Post an IMMEDIATE job and have a fresh contractor claim it.
    pub async fn claimed_job(&self) -> Result<(Job, Actor, Actor)> {
        let customer = Actor::customer(UserId::new());
        let contractor = Actor::contractor(UserId::new());
        let job = self.post(&customer, JobType::Immediate).await?;
        let job = self
            .jobs
            .claim(job.id, &contractor, vec![])
            .await
            .context("claiming job")?;
        Ok((job, customer, contractor))
    }
}

pub fn quote(amount: i64, total: Option<i64>) -> QuoteDraft {
    QuoteDraft {
        amount: Decimal::from(amount),
        total_amount: total.map(Decimal::from),
        ..QuoteDraft::default()
    }
}
