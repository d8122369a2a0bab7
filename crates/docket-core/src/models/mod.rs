//! Data models for the ingestion pipeline
//!
//! Wire messages exchanged over the broker, the documents persisted on completion and
//! the collaborator records the completion step reads.

mod audit;
mod dataset;
mod form;
mod messages;
mod upload;
mod user;

pub use audit::*;
pub use dataset::*;
pub use form::*;
pub use messages::*;
pub use upload::*;
pub use user::*;
