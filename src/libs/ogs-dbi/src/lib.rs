//! NextGCore Database Interface Library
//!
//! Subscriber data access for the HSS: authentication material, SQN
//! bookkeeping and subscription profiles, keyed by SUPI
//! (e.g. "imsi-001010000000001").

pub mod types;
pub mod mongoc;
pub mod subscription;
pub mod memory;

#[cfg(test)]
mod property_tests;

// Re-export commonly used types
pub use types::*;
pub use mongoc::{DbiError, DbiResult, MongoDbi};
pub use subscription::{parse_auth_info, parse_subscription_data, OgsDbiAuthInfo};
pub use memory::MemoryDbi;

/// Subscriber data store
///
/// Implementations must be shareable across worker threads; callers may
/// serialize access on top but never rely on the store doing so.
pub trait SubscriberDb: Send + Sync {
    /// Authentication material for `supi`
    fn auth_info(&self, supi: &str) -> DbiResult<OgsDbiAuthInfo>;

    /// Overwrite the stored SQN (masked to 48 bits)
    fn update_sqn(&self, supi: &str, sqn: u64) -> DbiResult<()>;

    /// Advance the stored SQN by 32, wrapping at 48 bits
    fn increment_sqn(&self, supi: &str) -> DbiResult<()>;

    /// Subscription profile for `supi`
    fn subscription_data(&self, supi: &str) -> DbiResult<OgsSubscriptionData>;
}
