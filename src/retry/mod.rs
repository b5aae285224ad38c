//! Retry decision engine
//!
//! Classifies transient network and service failures and decides whether and
//! how long to wait before the next attempt.

mod policy;

pub use policy::{http_failure, AttemptFailure, RetryDecision, RetryPolicy};
