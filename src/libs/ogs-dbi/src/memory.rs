//! In-memory subscriber database
//!
//! Keeps subscribers in a process-local map. Used by lab deployments without
//! MongoDB and by tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::mongoc::{split_supi, DbiError, DbiResult};
use crate::subscription::OgsDbiAuthInfo;
use crate::types::*;
use crate::SubscriberDb;

#[derive(Debug, Clone, Default)]
struct Subscriber {
    auth_info: OgsDbiAuthInfo,
    subscription_data: OgsSubscriptionData,
}

/// Subscriber database held in memory
#[derive(Debug, Default)]
pub struct MemoryDbi {
    subscribers: Mutex<HashMap<String, Subscriber>>,
}

impl MemoryDbi {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<String, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Provision (or replace) a subscriber; the SQN is masked to 48 bits
    pub fn insert(
        &self,
        supi: &str,
        mut auth_info: OgsDbiAuthInfo,
        subscription_data: OgsSubscriptionData,
    ) -> DbiResult<()> {
        split_supi(supi)?;
        auth_info.sqn &= OGS_MAX_SQN;
        self.subscribers().insert(
            supi.to_string(),
            Subscriber {
                auth_info,
                subscription_data,
            },
        );
        log::debug!("[{supi}] subscriber provisioned");
        Ok(())
    }

    /// Number of provisioned subscribers
    pub fn len(&self) -> usize {
        self.subscribers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_subscriber<R>(
        &self,
        supi: &str,
        f: impl FnOnce(&mut Subscriber) -> R,
    ) -> DbiResult<R> {
        split_supi(supi)?;
        let mut subscribers = self.subscribers();
        let subscriber = subscribers
            .get_mut(supi)
            .ok_or_else(|| DbiError::SubscriberNotFound(supi.to_string()))?;
        Ok(f(subscriber))
    }
}

impl SubscriberDb for MemoryDbi {
    fn auth_info(&self, supi: &str) -> DbiResult<OgsDbiAuthInfo> {
        self.with_subscriber(supi, |s| s.auth_info.clone())
    }

    fn update_sqn(&self, supi: &str, sqn: u64) -> DbiResult<()> {
        self.with_subscriber(supi, |s| s.auth_info.sqn = sqn & OGS_MAX_SQN)
    }

    fn increment_sqn(&self, supi: &str) -> DbiResult<()> {
        self.with_subscriber(supi, |s| {
            s.auth_info.sqn = s.auth_info.sqn.wrapping_add(OGS_SQN_INCREMENT) & OGS_MAX_SQN
        })
    }

    fn subscription_data(&self, supi: &str) -> DbiResult<OgsSubscriptionData> {
        self.with_subscriber(supi, |s| s.subscription_data.clone())
    }
}
