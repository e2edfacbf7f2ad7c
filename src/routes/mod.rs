//! HTTP route handlers.

pub mod client;
pub mod compute;
pub mod form;
pub mod health;

pub use compute::ComputeState;
pub use health::{build_info, health};
