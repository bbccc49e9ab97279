pub mod auth;

pub use auth::{WorkerBearer, auth_middleware};
