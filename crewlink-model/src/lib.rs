//! Data model shared across crewlink crates.

pub mod actor;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod location;
pub mod quote;

pub use actor::{Actor, ActorRole};
pub use error::ModelError;
pub use events::{RoomEvent, RoomKey, TravelEndReason};
pub use ids::{JobId, QuoteId, UserId, WorkerId};
pub use job::{Job, JobStatus, JobType, NewJob};
pub use location::{
    Coordinates, EmitterRole, LocationCapability, LocationSample, TravelStatus,
};
pub use quote::{ADVANCE_CAP_PERCENT, Quote, QuoteStatus, QuoteSubmission};
