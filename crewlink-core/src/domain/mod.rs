pub mod jobs;
pub mod location;
pub mod quotes;
pub mod session;

pub use jobs::{CancellationPolicy, JobClosedListener, JobStateMachine};
pub use location::{
    LocationBroadcastChannel, LocationSharingService, LocationSubscription, SampleOutcome,
    ShareLifetimes, TravelCredential,
};
pub use quotes::{QuoteDraft, QuoteLedger};
pub use session::{ActiveJobSynchronizer, ActiveJobView};
