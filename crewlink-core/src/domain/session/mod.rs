mod synchronizer;

pub use synchronizer::{ActiveJobSynchronizer, ActiveJobView};
