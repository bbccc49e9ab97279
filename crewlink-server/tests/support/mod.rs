#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use axum_test::TestServer;
use crewlink_core::database::Repositories;
use crewlink_model::{Actor, UserId};
use crewlink_server::{
    AppState,
    infra::config::Config,
    routes::create_app,
};

/// An in-memory, dev-mode server plus the state behind it.
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_config(Config {
            dev_mode: true,
            ..Config::default()
        })
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let state = AppState::new(Arc::new(config), Repositories::in_memory())?;
        let server = TestServer::new(create_app(state.clone()))
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
        Ok(Self { server, state })
    }

    /// Mint a session for `actor` without going through HTTP.
    pub fn session_for(&self, actor: Actor) -> Result<String> {
        Ok(self.state.sessions.issue(actor)?.token)
    }

    pub fn customer(&self) -> Result<(Actor, String)> {
        let actor = Actor::customer(UserId::new());
        Ok((actor, self.session_for(actor)?))
    }

    pub fn contractor(&self) -> Result<(Actor, String)> {
        let actor = Actor::contractor(UserId::new());
        Ok((actor, self.session_for(actor)?))
    }
}
