// Domain value objects
pub mod identifiers;
pub mod pipeline_mode;
pub mod severity;
pub mod topic;

pub use identifiers::*;
pub use pipeline_mode::*;
pub use severity::*;
pub use topic::*;
