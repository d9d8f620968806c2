pub mod alert_queries;
pub mod dead_letter_queries;
pub mod score_queries;

pub use alert_queries::*;
pub use dead_letter_queries::*;
pub use score_queries::*;
