// Consumer groups draining the event channel

pub mod alert_handler;
pub mod handler;
pub mod retry;
pub mod scoring_handler;
pub mod worker;

pub use alert_handler::*;
pub use handler::*;
pub use retry::*;
pub use scoring_handler::*;
pub use worker::*;
