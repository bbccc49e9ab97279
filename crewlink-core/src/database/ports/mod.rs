//! Repository ports grouped by bounded context. Adapters live in
//! [`crate::database::memory`] and, with the `database` feature,
//! [`crate::database::postgres`].

pub mod jobs;
pub mod location;
pub mod notifications;
pub mod quotes;

pub use jobs::{ContractorGuard, JobGuard, JobRepository, JobUpdate};
pub use location::{
    LatestSampleStore, LocationGrantRecord, LocationGrantRepository, LocationTokenRecord,
    LocationTokenRepository, NewLocationGrant,
};
pub use notifications::{NewNotification, NotificationRecord, NotificationRepository};
pub use quotes::{AcceptedQuote, QuoteRepository};
