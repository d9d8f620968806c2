// Fraudline application layer

pub mod commands;
pub mod consumer;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod queries;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use error::AppError;
pub use metrics::Metrics;
pub use state::{AppState, PipelineSettings};
