//! NextGCore Core Utilities Library
//!
//! Fundamental data structures shared by the NextGCore network functions.

pub mod pool;      // Object pool (ogs-pool.h)

// Re-export commonly used types
pub use pool::{OgsPool, PoolError, PoolHandle, PoolResult};
