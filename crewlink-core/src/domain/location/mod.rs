//! Location sharing: code-for-token exchange and the live travel feed.

pub mod broadcast;
pub mod sharing;

pub use broadcast::{LocationBroadcastChannel, LocationSubscription, SampleOutcome, TravelCredential};
pub use sharing::{
    IssuedCode, IssuedToken, LocationSharingService, MAX_CODE_ATTEMPTS, PurgeReport,
    ShareLifetimes, TokenScope, normalize_phone,
};
