//! HTTP client module
//!
//! Provides the HTTP client used by API destinations.
//!
//! # Features
//!
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Status Classification**: throttling, timeouts and server errors map to
//!   transient errors; other refusals are permanent

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
