use std::{fmt, sync::Arc};

use crewlink_core::{
    ShareCrypto,
    database::Repositories,
    domain::{
        ActiveJobSynchronizer, JobStateMachine, LocationBroadcastChannel,
        LocationSharingService, QuoteLedger,
    },
    error::CryptoError,
    realtime::{Announcer, RoomHub},
};

use crate::infra::config::Config;
use crate::infra::sessions::SessionDirectory;
use crate::infra::websocket::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repositories: Repositories,
    pub hub: RoomHub,
    pub announcer: Announcer,
    pub jobs: Arc<JobStateMachine>,
    pub quotes: Arc<QuoteLedger>,
    pub sharing: Arc<LocationSharingService>,
    pub location: LocationBroadcastChannel,
    pub sessions: Arc<SessionDirectory>,
    pub websocket_manager: Arc<ConnectionManager>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire every service over one set of repositories and one room hub.
    pub fn new(
        config: Arc<Config>,
        repositories: Repositories,
    ) -> Result<Self, CryptoError> {
        let crypto = Arc::new(ShareCrypto::new(config.auth.token_key.as_bytes())?);
        let hub = RoomHub::new(config.location.room_capacity);
        let announcer =
            Announcer::new(hub.clone(), repositories.notifications.clone());

        let location = LocationBroadcastChannel::new(
            repositories.jobs.clone(),
            repositories.samples.clone(),
            hub.clone(),
        )
        .with_idle_timeout(config.location.travel_idle_timeout);

        let jobs = JobStateMachine::new(repositories.jobs.clone(), announcer.clone())
            .with_cancellation_policy(config.jobs.in_progress_cancellation)
            .with_listener(Arc::new(location.clone()));

        let quotes = QuoteLedger::new(
            repositories.jobs.clone(),
            repositories.quotes.clone(),
            announcer.clone(),
        );

        let sharing = LocationSharingService::new(
            repositories.jobs.clone(),
            repositories.grants.clone(),
            repositories.tokens.clone(),
            crypto.clone(),
        )
        .with_lifetimes(config.location.share_lifetimes());

        let sessions = SessionDirectory::new(crypto, config.auth.session_ttl);

        Ok(Self {
            config,
            repositories,
            hub,
            announcer,
            jobs: Arc::new(jobs),
            quotes: Arc::new(quotes),
            sharing: Arc::new(sharing),
            location,
            sessions: Arc::new(sessions),
            websocket_manager: Arc::new(ConnectionManager::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A synchronizer bound to this state's storage and rooms; the caller
    /// drives `init`/`teardown`.
    pub fn synchronizer(&self) -> ActiveJobSynchronizer {
        ActiveJobSynchronizer::new(
            self.repositories.jobs.clone(),
            self.repositories.notifications.clone(),
            self.hub.clone(),
        )
    }
}
