//! Object memory
//!
//! All object instances and class descriptors are carved out of the pooled
//! allocator's arena.

mod pool;

pub use pool::{PooledObjectAllocator, MIN_OBJECT_ALIGNMENT};
