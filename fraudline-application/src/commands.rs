pub mod ingest_commands;
pub mod reanalysis_commands;

pub use ingest_commands::*;
pub use reanalysis_commands::*;
