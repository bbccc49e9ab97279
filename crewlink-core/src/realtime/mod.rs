//! Real-time fan-out rooms and the announcer that feeds them.

pub mod announcer;
pub mod hub;

pub use announcer::Announcer;
pub use hub::{DEFAULT_ROOM_CAPACITY, RoomHub, RoomSubscription};
