//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, request ID)
//!     → request.rs (user header, JSON body)
//!     → handlers.rs (aggregator for reads, orchestrator for writes)
//!     → response.rs (error mapping, verbatim relay)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UserName, X_USER_NAME};
pub use response::ApiError;
pub use server::{AppState, HttpServer, ServerError};
