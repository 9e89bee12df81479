//! Control loop state machine and decision rate limiting.

mod bridge_loop;
mod rate_limit;

pub use bridge_loop::{BridgeError, ControlLoop, LoopState};
pub use rate_limit::RateLimiter;
