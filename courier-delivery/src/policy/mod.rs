//! Policies that govern what the delivery worker does after an attempt.

pub mod retry;

pub use retry::RetryPolicy;
