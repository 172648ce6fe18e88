//! Round-robin HTTP load balancer
//!
//! The endpoint the load test targets. Requests are spread over a pool of
//! backends, skipping the ones the health checker marked down.

pub mod health;
pub mod pool;
pub mod routes;

pub use health::spawn_health_checker;
pub use pool::{Backend, BackendPool};
pub use routes::{BalancerState, ServerRequest, balancer_routes};
