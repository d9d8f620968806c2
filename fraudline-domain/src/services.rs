// Domain services
pub mod scoring;

pub use scoring::*;
