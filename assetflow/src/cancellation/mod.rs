//! Cooperative cancellation for running builds.

mod token;

pub use token::CancellationToken;
