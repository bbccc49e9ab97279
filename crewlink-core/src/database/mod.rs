pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;
pub mod ports;

use std::{any::type_name_of_val, fmt, sync::Arc};

use ports::{
    JobRepository, LatestSampleStore, LocationGrantRepository, LocationTokenRepository,
    NotificationRepository, QuoteRepository,
};

pub use memory::InMemoryStore;

/// One handle per port, all backed by the same storage engine.
#[derive(Clone)]
pub struct Repositories {
    pub jobs: Arc<dyn JobRepository>,
    pub quotes: Arc<dyn QuoteRepository>,
    pub grants: Arc<dyn LocationGrantRepository>,
    pub tokens: Arc<dyn LocationTokenRepository>,
    pub samples: Arc<dyn LatestSampleStore>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl fmt::Debug for Repositories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repositories")
            .field("jobs", &type_name_of_val(self.jobs.as_ref()))
            .field("quotes", &type_name_of_val(self.quotes.as_ref()))
            .field("grants", &type_name_of_val(self.grants.as_ref()))
            .finish_non_exhaustive()
    }
}

impl Repositories {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            jobs: store.clone(),
            quotes: store.clone(),
            grants: store.clone(),
            tokens: store.clone(),
            samples: store.clone(),
            notifications: store,
        }
    }

    #[cfg(feature = "database")]
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let location = Arc::new(postgres::PostgresLocationRepository::new(pool.clone()));
        Self {
            jobs: Arc::new(postgres::PostgresJobRepository::new(pool.clone())),
            quotes: Arc::new(postgres::PostgresQuoteRepository::new(pool.clone())),
            grants: location.clone(),
            tokens: location.clone(),
            samples: location,
            notifications: Arc::new(postgres::PostgresNotificationRepository::new(pool)),
        }
    }
}
