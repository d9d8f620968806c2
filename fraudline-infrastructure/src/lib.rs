pub mod channel;
pub mod config;
pub mod repositories;
pub mod services;

pub use channel::*;
pub use config::*;
pub use repositories::*;
pub use services::*;
