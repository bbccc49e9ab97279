mod support;

use std::sync::Arc;

use anyhow::Result;
use crewlink_core::DomainError;
use crewlink_model::{Actor, JobStatus, JobType, RoomEvent, RoomKey, UserId, WorkerId};
use support::Marketplace;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_exactly_one_winner() -> Result<()> {
    let market = Arc::new(Marketplace::in_memory());
    let customer = Actor::customer(UserId::new());
    let job = market.post(&customer, JobType::Immediate).await?;

    let contenders: Vec<_> = (0..8)
        .map(|_| {
            let market = Arc::clone(&market);
            tokio::spawn(async move {
                let contractor = Actor::contractor(UserId::new());
                market.jobs.claim(job.id, &contractor, vec![]).await
            })
        })
        .collect();

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in contenders {
        match handle.await? {
            Ok(claimed) => {
                assert_eq!(claimed.status, JobStatus::Accepted);
                winners += 1;
            }
            Err(DomainError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected claim error: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(conflicts, 7);
    Ok(())
}

#[tokio::test]
async fn terminal_jobs_reject_every_transition() -> Result<()> {
    let market = Marketplace::in_memory();

    let (completed, customer, contractor) = market.claimed_job().await?;
    market.jobs.start(completed.id, &contractor).await?;
    market.jobs.complete(completed.id, &contractor).await?;

    let (cancelled, cancel_customer, cancel_contractor) = market.claimed_job().await?;
    market.jobs.cancel(cancelled.id, &cancel_customer).await?;

    let (disputed, dispute_customer, dispute_contractor) = market.claimed_job().await?;
    market.jobs.dispute(disputed.id, &dispute_customer).await?;

    let cases = [
        (completed.id, customer, contractor),
        (cancelled.id, cancel_customer, cancel_contractor),
        (disputed.id, dispute_customer, dispute_contractor),
    ];
    for (job_id, customer, contractor) in cases {
        let attempts = [
            market.jobs.start(job_id, &contractor).await,
            market.jobs.complete(job_id, &contractor).await,
            market.jobs.cancel(job_id, &customer).await,
            market.jobs.dispute(job_id, &contractor).await,
        ];
        for attempt in attempts {
            assert!(
                matches!(attempt, Err(DomainError::InvalidTransition(_))),
                "expected InvalidTransition, got {attempt:?}"
            );
        }
        assert!(matches!(
            market
                .jobs
                .claim(job_id, &Actor::contractor(UserId::new()), vec![])
                .await,
            Err(DomainError::InvalidTransition(_))
        ));
    }
    Ok(())
}

#[tokio::test]
async fn lifecycle_events_reach_job_and_actor_rooms() -> Result<()> {
    let market = Marketplace::in_memory();
    let customer = Actor::customer(UserId::new());
    let contractor = Actor::contractor(UserId::new());
    let job = market.post(&customer, JobType::Scheduled).await?;

    let mut job_room = market.hub.subscribe(RoomKey::Job(job.id));
    let mut customer_room = market.hub.subscribe(RoomKey::Actor(customer.id));

    market.jobs.claim(job.id, &contractor, vec![]).await?;
    market.jobs.start(job.id, &contractor).await?;

    assert_eq!(
        job_room.recv().await?,
        RoomEvent::JobAccepted {
            job_id: job.id,
            contractor_id: contractor.id
        }
    );
    assert_eq!(job_room.recv().await?, RoomEvent::JobStarted { job_id: job.id });

    let mut names = Vec::new();
    while let Some(event) = customer_room.try_recv() {
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec!["job:accepted", "notification", "job:started", "notification"]
    );
    Ok(())
}

#[tokio::test]
async fn active_job_tracks_each_party() -> Result<()> {
    let market = Marketplace::in_memory();
    let (job, customer, contractor) = market.claimed_job().await?;

    let worker = WorkerId::new();
    market
        .jobs
        .assign_workers(job.id, &contractor, vec![worker, worker])
        .await?;

    let active = market.jobs.active_job(&contractor).await?.expect("active job");
    assert_eq!(active.id, job.id);
    assert_eq!(active.assigned_workers, vec![worker]);
    assert_eq!(
        market.jobs.active_job(&customer).await?.map(|j| j.id),
        Some(job.id)
    );

    market.jobs.cancel(job.id, &contractor).await?;
    assert!(market.jobs.active_job(&contractor).await?.is_none());
    assert!(market.jobs.active_job(&customer).await?.is_none());
    Ok(())
}
