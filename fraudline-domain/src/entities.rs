// Domain entities
pub mod aggregate;
pub mod alert_delivery;
pub mod dead_letter;
pub mod events;
pub mod policy;
pub mod record;
pub mod score;
pub mod transaction;

pub use aggregate::*;
pub use alert_delivery::*;
pub use dead_letter::*;
pub use events::*;
pub use policy::*;
pub use record::*;
pub use score::*;
pub use transaction::*;
