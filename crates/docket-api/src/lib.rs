//! Docket ingest gateway
//!
//! Accepts multipart dataset uploads, stages them on local disk and announces each staged
//! file on the `path` topic of the public broker.

pub mod api_doc;
pub mod error;
pub mod handlers;
pub mod setup;
pub mod staging;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use setup::{build_router, initialize_app};
pub use state::AppState;
