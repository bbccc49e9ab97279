//! HTTP request handlers organized by caller

pub mod contractor;
pub mod dev;
pub mod jobs;
pub mod notifications;
pub mod websocket;
pub mod worker;
