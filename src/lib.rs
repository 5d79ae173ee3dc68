//! API Gate - Shared Admission Gate
//!
//! This crate implements a single-process admission gate that many callers
//! query before performing a rate-sensitive external action. A sliding
//! 60-second reservation window keeps the aggregate call rate under a
//! configured ceiling by delaying callers instead of refusing them.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
