//! Docket Infrastructure Library
//!
//! Shared plumbing for the gateway and the worker:
//! - Telemetry initialization (tracing subscriber)
//! - Request ID middleware
//! - Shutdown signal handling

#[cfg(feature = "middleware")]
pub mod middleware;

pub mod shutdown;
pub mod telemetry;

// Re-export commonly used types
#[cfg(feature = "middleware")]
pub use middleware::{get_request_id, request_id_middleware, RequestId};

pub use shutdown::{cancel_on_shutdown, shutdown_signal};
pub use telemetry::init_telemetry;
