//! HTTP transport for the context-memory tool surface: a thin axum layer
//! over `ctx-core`/`ctx-storage`/`ctx-embed`/`ctx-expand`/`ctx-sync`/
//! `ctx-query`/`ctx-auth`. Routing and (de)serialization only; the actual
//! tool logic lives in [`orchestrate`].

pub mod bootstrap;
pub mod envelope;
pub mod error;
pub mod lookup;
pub mod macros;
pub mod middleware;
pub mod orchestrate;
pub mod routes;
pub mod state;

pub use bootstrap::build_state;
pub use envelope::{Envelope, Timings, Warning};
pub use error::{ApiError, ApiResult};
pub use middleware::auth::{auth_middleware, AuthMiddlewareState, PrincipalExtractor, RateLimiter};
pub use routes::router as build_router;
pub use state::AppState;
