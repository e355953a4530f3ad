//! Retry parameters and fuzzed exponential backoff.
//!
//! This module owns the numeric side of retrying: how many attempts a request
//! gets, how long to wait between them, and which HTTP statuses are worth
//! retrying at all. The networking engine threads one [`Backoff`] through the
//! whole URI rotation of a request.

mod backoff;
mod classify;
mod params;

pub use backoff::{fuzz, Backoff};
pub use classify::classify_http_status;
pub use params::{default_retry_parameters, RetryParameters};
