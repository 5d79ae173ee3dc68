//! HTTP gate service exposing the admission controller.

mod auth;
mod server;
mod service;

pub use auth::{require_token, AuthToken};
pub use server::GateServer;
pub use service::{
    router, AccessResponse, ErrorResponse, RateLimitResponse, RequestAccessParams,
    SetRateLimitParams, SetRateLimitResponse,
};
