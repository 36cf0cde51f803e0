pub mod cache;
pub mod invalidation;
pub mod query_cache;

pub use cache::*;
pub use invalidation::*;
pub use query_cache::*;
