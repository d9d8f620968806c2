pub mod partitioned;

pub use partitioned::*;
