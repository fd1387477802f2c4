//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace/timeout/metrics layers)
//!     → handlers.rs (route)
//!         → security::RequestGuard::check (ordered checks)
//!         → request.rs (request/correlation ids, client IP)
//!     → logs/ or cache/ or signing/
//!     → response.rs (JSON body, ids, security headers)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestContext, X_CORRELATION_ID, X_REQUEST_ID};
pub use response::ErrorReply;
pub use server::{AppState, Dependencies, HttpServer};
