mod cancellation;
mod state_machine;

pub use cancellation::CancellationPolicy;
pub use state_machine::{JobClosedListener, JobStateMachine};
