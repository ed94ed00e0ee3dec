//! Cooperative cancellation.
//!
//! Each job owns one [`CancellationToken`]; the registry flips it and the
//! orchestrator observes it between stages.

mod token;

pub use token::CancellationToken;
