pub mod alert_service;
pub mod dead_letter_service;

pub use alert_service::*;
pub use dead_letter_service::*;
