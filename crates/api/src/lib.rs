//! Magnetarr addon-protocol HTTP surface
//!
//! Thin front over the search dispatcher: a static manifest and a stream
//! endpoint that turns each request into one aggregated search. Ranking,
//! quality filtering and any user configuration live downstream.

pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use handlers::AppState;
pub use models::{Manifest, Stream, StreamsResponse};
pub use routes::router;
