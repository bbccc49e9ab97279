mod support;

use anyhow::Result;
use crewlink_core::DomainError;
use crewlink_model::{Actor, JobStatus, JobType, QuoteStatus, UserId};
use rust_decimal::Decimal;
use support::{Marketplace, quote};

#[tokio::test]
async fn accepting_a_quote_invalidates_its_siblings() -> Result<()> {
    let market = Marketplace::in_memory();
    let customer = Actor::customer(UserId::new());
    let job = market.post(&customer, JobType::Bidding).await?;

    let first = Actor::contractor(UserId::new());
    let second = Actor::contractor(UserId::new());
    let third = Actor::contractor(UserId::new());

    let winning = market.quotes.submit(job.id, &first, quote(400, None)).await?;
    let losing = market.quotes.submit(job.id, &second, quote(350, Some(380))).await?;
    market.quotes.submit(job.id, &third, quote(500, None)).await?;

    // resubmission overwrites the contractor's pending quote in place
    let resubmitted = market.quotes.submit(job.id, &first, quote(420, None)).await?;
    assert_eq!(resubmitted.id, winning.id);
    assert_eq!(resubmitted.amount, Decimal::from(420));
    assert_eq!(market.quotes.list_quotes(job.id, &customer).await?.len(), 3);

    let accepted = market.quotes.accept(job.id, winning.id, &customer).await?;
    assert_eq!(accepted.job.status, JobStatus::Accepted);
    assert_eq!(accepted.job.contractor_id, Some(first.id));
    assert_eq!(accepted.quote.status, QuoteStatus::Accepted);
    assert_eq!(accepted.invalidated, 2);

    let stored = market.repos.quotes.list_for_job(job.id).await?;
    let statuses: Vec<_> = stored.iter().map(|q| (q.contractor_id, q.status)).collect();
    assert!(statuses.contains(&(first.id, QuoteStatus::Accepted)));
    assert!(statuses.contains(&(second.id, QuoteStatus::Invalidated)));
    assert!(statuses.contains(&(third.id, QuoteStatus::Invalidated)));

    let err = market
        .quotes
        .accept(job.id, losing.id, &customer)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn quotes_are_refused_once_the_job_is_awarded() -> Result<()> {
    let market = Marketplace::in_memory();
    let customer = Actor::customer(UserId::new());
    let job = market.post(&customer, JobType::Bidding).await?;
    let contractor = Actor::contractor(UserId::new());

    let submitted = market.quotes.submit(job.id, &contractor, quote(100, None)).await?;
    market.quotes.accept(job.id, submitted.id, &customer).await?;

    let late = market
        .quotes
        .submit(job.id, &Actor::contractor(UserId::new()), quote(90, None))
        .await
        .unwrap_err();
    assert!(matches!(late, DomainError::InvalidTransition(_)));

    let withdraw = market
        .quotes
        .cancel_quote(job.id, submitted.id, &contractor)
        .await
        .unwrap_err();
    assert!(matches!(withdraw, DomainError::InvalidTransition(_)));
    Ok(())
}

#[tokio::test]
async fn claimable_jobs_take_no_quotes_and_bidding_jobs_take_no_claims() -> Result<()> {
    let market = Marketplace::in_memory();
    let customer = Actor::customer(UserId::new());
    let contractor = Actor::contractor(UserId::new());

    let immediate = market.post(&customer, JobType::Immediate).await?;
    assert!(matches!(
        market.quotes.submit(immediate.id, &contractor, quote(10, None)).await,
        Err(DomainError::Validation(_))
    ));

    let bidding = market.post(&customer, JobType::Bidding).await?;
    assert!(matches!(
        market.jobs.claim(bidding.id, &contractor, vec![]).await,
        Err(DomainError::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn advance_cap_is_inclusive_at_twenty_percent() -> Result<()> {
    let market = Marketplace::in_memory();
    let customer = Actor::customer(UserId::new());
    let contractor = Actor::contractor(UserId::new());
    let job = market.post(&customer, JobType::Bidding).await?;

    // total_amount (1000) takes precedence over amount for the cap
    let submitted = market
        .quotes
        .submit(job.id, &contractor, quote(800, Some(1000)))
        .await?;
    market.quotes.accept(job.id, submitted.id, &customer).await?;

    let over = market
        .quotes
        .request_advance(job.id, submitted.id, &contractor, Decimal::new(20001, 2))
        .await
        .unwrap_err();
    assert!(matches!(over, DomainError::Validation(_)), "got {over:?}");

    let zero = market
        .quotes
        .request_advance(job.id, submitted.id, &contractor, Decimal::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(zero, DomainError::Validation(_)));

    let at_cap = market
        .quotes
        .request_advance(job.id, submitted.id, &contractor, Decimal::from(200))
        .await?;
    assert!(at_cap.advance_requested);
    assert_eq!(at_cap.advance_amount, Decimal::from(200));

    let again = market
        .quotes
        .request_advance(job.id, submitted.id, &contractor, Decimal::from(50))
        .await
        .unwrap_err();
    assert!(matches!(again, DomainError::Conflict(_)));
    Ok(())
}

#[tokio::test]
async fn only_the_posting_customer_accepts() -> Result<()> {
    let market = Marketplace::in_memory();
    let customer = Actor::customer(UserId::new());
    let job = market.post(&customer, JobType::Bidding).await?;
    let submitted = market
        .quotes
        .submit(job.id, &Actor::contractor(UserId::new()), quote(100, None))
        .await?;

    let err = market
        .quotes
        .accept(job.id, submitted.id, &Actor::customer(UserId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Unauthorized(_)));
    Ok(())
}
