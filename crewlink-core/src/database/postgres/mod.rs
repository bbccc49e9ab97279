//! PostgreSQL adapters. Every guarded mutation is a single
//! `UPDATE … WHERE … RETURNING`, or a transaction when it spans tables.

mod jobs;
mod location;
mod notifications;
mod quotes;
mod rows;

pub use jobs::PostgresJobRepository;
pub use location::PostgresLocationRepository;
pub use notifications::PostgresNotificationRepository;
pub use quotes::PostgresQuoteRepository;
