pub mod controller;
pub mod intake;
pub mod maintenance;
pub mod request;
pub mod service;

pub use controller::{Courier, MaintenanceConfig, SHUTDOWN_BROADCAST};
pub use request::{SendRequest, Submission, ThrottleReason};
pub use service::Service;
