//! HTTP transport adapter: axum server, auth middleware, handlers, SSE
//! progress stream, CSV input/output.

pub mod auth;
pub mod csv_io;
pub mod handlers;
pub mod server;
pub mod sse;

pub use handlers::{AppState, Limits};
pub use server::{HttpServer, ServerConfig};
