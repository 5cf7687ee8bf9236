//! HTTP surface for case classification.
//!
//! `POST /process_text` classifies one case, `POST /process_bulk` a list of
//! cases, `GET /health` reports liveness. The router is composable:
//! `prediction_router()` returns a `Router` that can be mounted on any axum
//! server instance.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::prediction_router;
pub use server::{start_server, PredictionServer, ServerSession};
pub use types::ApiContext;
