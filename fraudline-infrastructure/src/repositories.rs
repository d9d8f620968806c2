pub mod memory_store;
pub mod policy_files;

pub use memory_store::*;
pub use policy_files::*;
