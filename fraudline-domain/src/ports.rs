// Port traits
// What the pipeline needs from infrastructure

pub mod channel;
pub mod repositories;
pub mod services;

pub use channel::*;
pub use repositories::*;
pub use services::*;
