use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{Value, json};

#[path = "support/mod.rs"]
mod support;
use support::TestApp;

async fn post_job(app: &TestApp, token: &str, job_type: &str) -> Result<String> {
    let response = app
        .server
        .post("/api/v1/user/jobs")
        .authorization_bearer(token)
        .json(&json!({
            "title": "Replace kitchen tiles",
            "job_type": job_type,
            "workers_needed": 2
        }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["status"], "PENDING");
    Ok(body["data"]["id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("job id missing"))?
        .to_string())
}

#[tokio::test]
async fn immediate_job_runs_from_claim_to_completion() -> Result<()> {
    let app = TestApp::new()?;
    let (_, customer) = app.customer()?;
    let (contractor_actor, contractor) = app.contractor()?;
    let job_id = post_job(&app, &customer, "IMMEDIATE").await?;

    let claim = app
        .server
        .post(&format!("/api/v1/contractor/jobs/{job_id}/claim"))
        .authorization_bearer(&contractor)
        .await;
    claim.assert_status_ok();
    let claimed: Value = claim.json();
    assert_eq!(claimed["data"]["status"], "ACCEPTED");
    assert_eq!(
        claimed["data"]["contractor_id"],
        contractor_actor.id.to_string()
    );

    let active: Value = app
        .server
        .get("/api/v1/jobs/active")
        .authorization_bearer(&customer)
        .await
        .json();
    assert_eq!(active["data"]["id"], job_id.as_str());

    app.server
        .post(&format!("/api/v1/contractor/jobs/{job_id}/start"))
        .authorization_bearer(&contractor)
        .await
        .assert_status_ok();

    let complete = app
        .server
        .post(&format!("/api/v1/contractor/jobs/{job_id}/complete"))
        .authorization_bearer(&contractor)
        .await;
    complete.assert_status_ok();
    let completed: Value = complete.json();
    assert_eq!(completed["data"]["status"], "COMPLETED");

    // Terminal jobs accept no further transitions
    let cancel = app
        .server
        .post(&format!("/api/v1/user/jobs/{job_id}/cancel"))
        .authorization_bearer(&customer)
        .await;
    cancel.assert_status(StatusCode::CONFLICT);
    let body: Value = cancel.json();
    assert_eq!(body["status"], "error");

    let active: Value = app
        .server
        .get("/api/v1/jobs/active")
        .authorization_bearer(&contractor)
        .await
        .json();
    assert!(active["data"].is_null());

    Ok(())
}

#[tokio::test]
async fn only_one_contractor_wins_a_claim() -> Result<()> {
    let app = TestApp::new()?;
    let (_, customer) = app.customer()?;
    let (_, first) = app.contractor()?;
    let (_, second) = app.contractor()?;
    let job_id = post_job(&app, &customer, "IMMEDIATE").await?;
    let path = format!("/api/v1/contractor/jobs/{job_id}/claim");

    let (a, b) = tokio::join!(
        async { app.server.post(&path).authorization_bearer(&first).await },
        async { app.server.post(&path).authorization_bearer(&second).await },
    );

    let mut statuses = vec![a.status_code(), b.status_code()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    Ok(())
}

#[tokio::test]
async fn workers_can_be_reassigned_on_an_engaged_job() -> Result<()> {
    let app = TestApp::new()?;
    let (_, customer) = app.customer()?;
    let (_, contractor) = app.contractor()?;
    let job_id = post_job(&app, &customer, "IMMEDIATE").await?;

    app.server
        .post(&format!("/api/v1/contractor/jobs/{job_id}/claim"))
        .authorization_bearer(&contractor)
        .json(&json!({ "worker_ids": [] }))
        .await
        .assert_status_ok();

    let worker = uuid::Uuid::now_v7().to_string();
    let assign = app
        .server
        .post(&format!("/api/v1/contractor/jobs/{job_id}/assign-workers"))
        .authorization_bearer(&contractor)
        .json(&json!({ "worker_ids": [worker] }))
        .await;
    assign.assert_status_ok();
    let body: Value = assign.json();
    assert_eq!(body["data"]["assigned_workers"], json!([worker]));

    Ok(())
}

#[tokio::test]
async fn customers_cannot_claim_and_strangers_cannot_read() -> Result<()> {
    let app = TestApp::new()?;
    let (_, customer) = app.customer()?;
    let (_, other_customer) = app.customer()?;
    let job_id = post_job(&app, &customer, "IMMEDIATE").await?;

    app.server
        .post(&format!("/api/v1/contractor/jobs/{job_id}/claim"))
        .authorization_bearer(&customer)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .get(&format!("/api/v1/jobs/{job_id}"))
        .authorization_bearer(&other_customer)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .get(&format!("/api/v1/jobs/{}", uuid::Uuid::now_v7()))
        .authorization_bearer(&customer)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    Ok(())
}
