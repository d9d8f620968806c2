pub mod context;
pub mod input;
pub mod lifecycle;
pub mod logging;

pub use context::AppContext;
pub use lifecycle::{run, Pipeline, RunOptions, RunSummary};
