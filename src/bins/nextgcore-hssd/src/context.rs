//! HSS Context Management
//!
//! HSS context with the IMPI/IMPU registry used by the Cx interface and the
//! subscriber database accessors used during authentication.
//!
//! Two independent locks:
//! - the Cx lock guards the identity registry; every `cx_*` call holds it for
//!   its whole duration, so Cx operations are linearizable;
//! - the DB lock serializes SUPI construction and the call into the
//!   subscriber database.
//!
//! No code path takes one lock while holding the other.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ogs_core::PoolHandle;
use ogs_dbi::{
    ogs_supi_from_imsi, OgsDbiAuthInfo, OgsSubscriptionData, SubscriberDb, OGS_RAND_LEN,
};

use crate::config::HssConfig;
use crate::cx_path::CxStats;
use crate::error::{HssError, HssResult};
use crate::registry::IdentityRegistry;

/// Outcome of [`HssContext::cx_set_server_name`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNameUpdate {
    /// The IMPU had no S-CSCF; it is bound now
    Assigned,
    /// The IMPU is already bound to this S-CSCF
    Unchanged,
    /// Bound to a different S-CSCF and overwritten
    Reassigned { previous: String },
    /// Bound to a different S-CSCF and kept; the request was not applied
    Rejected { current: String },
}

impl ServerNameUpdate {
    /// Whether the requested S-CSCF is the bound one after the call
    pub fn is_applied(&self) -> bool {
        !matches!(self, ServerNameUpdate::Rejected { .. })
    }
}

/// HSS Context
pub struct HssContext {
    config: HssConfig,
    /// Cx lock
    cx_lock: Mutex<IdentityRegistry>,
    /// DB lock
    db_lock: Mutex<Box<dyn SubscriberDb>>,
    cx_stats: CxStats,
}

impl HssContext {
    /// Create the context; identity pools are sized from `config.pool`
    pub fn init(config: HssConfig, db: Box<dyn SubscriberDb>) -> Self {
        let registry = IdentityRegistry::new(config.pool.impi, config.pool.impu);
        log::info!(
            "HSS context initialized (max_impi={}, max_impu={})",
            config.pool.impi,
            config.pool.impu
        );
        if let Some(smsc) = &config.sms_over_ims {
            log::info!("SMS over IMS via {smsc}");
        }
        if config.use_mongodb_change_stream {
            log::warn!("MongoDB change streams not supported, subscriber data is read per request");
        }

        Self {
            config,
            cx_lock: Mutex::new(registry),
            db_lock: Mutex::new(db),
            cx_stats: CxStats::default(),
        }
    }

    /// Tear the context down, releasing every IMPI and its IMPUs
    pub fn fini(self) {
        let mut registry = self.cx_lock.into_inner().unwrap_or_else(PoisonError::into_inner);
        let (impi, impu) = (registry.impi_count(), registry.impu_count());
        registry.impi_remove_all();
        log::info!("HSS context finalized (released {impi} IMPI, {impu} IMPU)");
        log::info!("{}", self.cx_stats);
    }

    pub fn config(&self) -> &HssConfig {
        &self.config
    }

    pub fn cx_stats(&self) -> &CxStats {
        &self.cx_stats
    }

    // A panic while the lock is held can only come from a violated
    // registry assertion, after which every record is still linked.
    pub(crate) fn registry(&self) -> MutexGuard<'_, IdentityRegistry> {
        self.cx_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn db(&self) -> MutexGuard<'_, Box<dyn SubscriberDb>> {
        self.db_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn impi_count(&self) -> usize {
        self.registry().impi_count()
    }

    pub fn impu_count(&self) -> usize {
        self.registry().impu_count()
    }

    // ========== Cx Identity Management ==========

    /// Associate an IMPI (User-Name) with an IMPU (Public-Identity)
    ///
    /// Creates whichever of the two is missing; associating an existing pair
    /// is a no-op. Fails only when an identity pool is exhausted, in which
    /// case nothing is half-created beyond a freshly added, childless IMPI.
    pub fn cx_associate_identity(&self, user_name: &str, public_identity: &str) -> HssResult<()> {
        let mut registry = self.registry();

        let impi = match registry.impi_find_by_id(user_name) {
            Some(impi) => impi,
            None => registry.impi_add(user_name).inspect_err(|e| log::error!("{e}"))?,
        };

        if registry.impu_find_by_id(impi, public_identity).is_none() {
            registry
                .impu_add(impi, public_identity)
                .inspect_err(|e| log::error!("[{user_name}] {e}"))?;
        }

        Ok(())
    }

    /// Check whether `public_identity` is associated with `user_name`
    ///
    /// An unknown IMPI is simply not associated.
    pub fn cx_identity_is_associated(&self, user_name: &str, public_identity: &str) -> bool {
        let registry = self.registry();
        registry
            .impi_find_by_id(user_name)
            .and_then(|impi| registry.impu_find_by_id(impi, public_identity))
            .is_some()
    }

    /// S-CSCF serving `public_identity`
    ///
    /// Falls back to the first S-CSCF bound to any IMPU of the same IMPI,
    /// in association order.
    pub fn cx_get_server_name(
        &self,
        user_name: &str,
        public_identity: &str,
    ) -> HssResult<Option<String>> {
        let registry = self.registry();
        let (impi, impu) = find_pair(&registry, user_name, public_identity)?;

        let server_name = registry
            .impu(impu)
            .and_then(|impu| impu.server_name.as_deref())
            .or_else(|| registry.impi_get_server_name(impi));

        Ok(server_name.map(str::to_string))
    }

    /// Bind `public_identity` to `server_name`
    ///
    /// An existing different binding is replaced only when `overwrite` is
    /// set; otherwise the existing S-CSCF stays and the call reports
    /// [`ServerNameUpdate::Rejected`].
    pub fn cx_set_server_name(
        &self,
        user_name: &str,
        public_identity: &str,
        server_name: &str,
        overwrite: bool,
    ) -> HssResult<ServerNameUpdate> {
        let mut registry = self.registry();
        let (_, impu) = find_pair(&registry, user_name, public_identity)?;
        let Some(impu) = registry.impu_mut(impu) else {
            return Err(not_associated(user_name, public_identity));
        };

        let update = match impu.server_name.clone() {
            None => {
                log::debug!("[{user_name}] S-CSCF assigned[{public_identity}->{server_name}]");
                impu.server_name = Some(server_name.to_string());
                ServerNameUpdate::Assigned
            }
            Some(current) if current == server_name => ServerNameUpdate::Unchanged,
            Some(previous) if overwrite => {
                log::warn!("S-CSCF reassignment[{previous}->{server_name}]");
                impu.server_name = Some(server_name.to_string());
                ServerNameUpdate::Reassigned { previous }
            }
            Some(current) => {
                log::error!("Use Old S-CSCF[{server_name}!={current}]");
                ServerNameUpdate::Rejected { current }
            }
        };

        Ok(update)
    }

    /// Drop an IMPI and all of its IMPUs
    ///
    /// Not used by the Diameter handlers; bindings otherwise live until the
    /// context is finalized.
    pub fn cx_remove_identity(&self, user_name: &str) -> bool {
        let mut registry = self.registry();
        match registry.impi_find_by_id(user_name) {
            Some(impi) => {
                registry.impi_remove(impi);
                true
            }
            None => false,
        }
    }

    // ========== Database Operations ==========

    pub fn db_auth_info(&self, imsi_bcd: &str) -> HssResult<OgsDbiAuthInfo> {
        let db = self.db();
        let supi = ogs_supi_from_imsi(imsi_bcd);
        Ok(db.auth_info(&supi)?)
    }

    /// `rand` is accepted alongside the SQN for re-synchronisation callers
    /// but is not stored
    pub fn db_update_sqn(
        &self,
        imsi_bcd: &str,
        _rand: &[u8; OGS_RAND_LEN],
        sqn: u64,
    ) -> HssResult<()> {
        let db = self.db();
        let supi = ogs_supi_from_imsi(imsi_bcd);
        Ok(db.update_sqn(&supi, sqn)?)
    }

    pub fn db_increment_sqn(&self, imsi_bcd: &str) -> HssResult<()> {
        let db = self.db();
        let supi = ogs_supi_from_imsi(imsi_bcd);
        Ok(db.increment_sqn(&supi)?)
    }

    pub fn db_subscription_data(&self, imsi_bcd: &str) -> HssResult<OgsSubscriptionData> {
        let db = self.db();
        let supi = ogs_supi_from_imsi(imsi_bcd);
        Ok(db.subscription_data(&supi)?)
    }
}

fn not_associated(user_name: &str, public_identity: &str) -> HssError {
    HssError::IdentityNotAssociated {
        user_name: user_name.to_string(),
        public_identity: public_identity.to_string(),
    }
}

fn find_pair(
    registry: &IdentityRegistry,
    user_name: &str,
    public_identity: &str,
) -> HssResult<(PoolHandle, PoolHandle)> {
    registry
        .impi_find_by_id(user_name)
        .and_then(|impi| Some((impi, registry.impu_find_by_id(impi, public_identity)?)))
        .ok_or_else(|| not_associated(user_name, public_identity))
}
