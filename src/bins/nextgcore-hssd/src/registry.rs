//! IMS Identity Registry
//!
//! Two-level ownership structure for the Cx interface: each private identity
//! (IMPI) owns an ordered list of public identities (IMPU). Records live in
//! two fixed-capacity pools and refer to each other by [`PoolHandle`]; an
//! IMPU's back-reference to its IMPI never keeps the parent alive.
//!
//! The registry does no locking of its own. [`crate::context::HssContext`]
//! only hands it out behind the Cx lock.

use std::collections::HashMap;

use ogs_core::{OgsPool, PoolHandle};

use crate::error::{HssError, HssResult};

/// HSS IMPI - IMS Private Identity
#[derive(Debug, Clone)]
pub struct HssImpi {
    /// IMPI string (User-Name)
    pub id: String,
    /// Owned IMPUs, in association order
    pub impu_list: Vec<PoolHandle>,
}

/// HSS IMPU - IMS Public Identity
#[derive(Debug, Clone)]
pub struct HssImpu {
    /// IMPU string (Public-Identity), unique within its IMPI
    pub id: String,
    /// Assigned S-CSCF
    pub server_name: Option<String>,
    /// Owning IMPI
    pub impi: PoolHandle,
}

/// IMPI/IMPU registry
pub struct IdentityRegistry {
    impi_pool: OgsPool<HssImpi>,
    impu_pool: OgsPool<HssImpu>,
    /// IMPI in creation order
    impi_list: Vec<PoolHandle>,
    impi_hash: HashMap<String, PoolHandle>,
}

impl IdentityRegistry {
    pub fn new(max_impi: usize, max_impu: usize) -> Self {
        Self {
            impi_pool: OgsPool::new("impi", max_impi),
            impu_pool: OgsPool::new("impu", max_impu),
            impi_list: Vec::new(),
            impi_hash: HashMap::new(),
        }
    }

    pub fn impi(&self, handle: PoolHandle) -> Option<&HssImpi> {
        self.impi_pool.find(handle)
    }

    pub fn impu(&self, handle: PoolHandle) -> Option<&HssImpu> {
        self.impu_pool.find(handle)
    }

    pub fn impu_mut(&mut self, handle: PoolHandle) -> Option<&mut HssImpu> {
        self.impu_pool.find_mut(handle)
    }

    pub fn impi_count(&self) -> usize {
        self.impi_hash.len()
    }

    pub fn impu_count(&self) -> usize {
        self.impu_pool.allocated()
    }

    /// IMPI ids in creation order
    pub fn impi_ids(&self) -> Vec<String> {
        self.impi_list
            .iter()
            .filter_map(|&h| self.impi(h))
            .map(|impi| impi.id.clone())
            .collect()
    }

    // ========== IMPI ==========

    /// Add a new IMPI; the caller has checked it is not present
    pub fn impi_add(&mut self, id: &str) -> HssResult<PoolHandle> {
        debug_assert!(!self.impi_hash.contains_key(id));

        let impi = self.impi_pool.alloc(HssImpi {
            id: id.to_string(),
            impu_list: Vec::new(),
        })?;
        self.impi_hash.insert(id.to_string(), impi);
        self.impi_list.push(impi);

        log::debug!("[{id}] IMPI added (total={})", self.impi_count());
        Ok(impi)
    }

    /// Remove an IMPI together with every IMPU it owns
    pub fn impi_remove(&mut self, impi: PoolHandle) {
        self.impu_remove_all(impi);

        self.impi_list.retain(|&h| h != impi);
        if let Some(record) = self.impi_pool.free(impi) {
            self.impi_hash.remove(&record.id);
            log::debug!("[{}] IMPI removed", record.id);
        }
    }

    pub fn impi_remove_all(&mut self) {
        for impi in std::mem::take(&mut self.impi_list) {
            self.impu_remove_all(impi);
            if let Some(record) = self.impi_pool.free(impi) {
                self.impi_hash.remove(&record.id);
            }
        }
    }

    pub fn impi_find_by_id(&self, id: &str) -> Option<PoolHandle> {
        self.impi_hash.get(id).copied()
    }

    /// First server name bound to any IMPU of `impi`, in association order
    pub fn impi_get_server_name(&self, impi: PoolHandle) -> Option<&str> {
        self.impi(impi)?
            .impu_list
            .iter()
            .filter_map(|&h| self.impu(h))
            .find_map(|impu| impu.server_name.as_deref())
    }

    // ========== IMPU ==========

    /// Add a new IMPU under `impi`; the caller has checked it is not present
    ///
    /// Fails with [`HssError::StaleHandle`] when `impi` has been released.
    pub fn impu_add(&mut self, impi: PoolHandle, id: &str) -> HssResult<PoolHandle> {
        if self.impi(impi).is_none() {
            return Err(HssError::StaleHandle("impi"));
        }
        debug_assert!(self.impu_find_by_id(impi, id).is_none());

        let impu = self.impu_pool.alloc(HssImpu {
            id: id.to_string(),
            server_name: None,
            impi,
        })?;

        if let Some(parent) = self.impi_pool.find_mut(impi) {
            parent.impu_list.push(impu);
            log::debug!("[{}] IMPU added: {id}", parent.id);
        }
        Ok(impu)
    }

    /// Unlink an IMPU from its IMPI and release it
    pub fn impu_remove(&mut self, impu: PoolHandle) {
        let Some(record) = self.impu_pool.free(impu) else {
            return;
        };
        if let Some(parent) = self.impi_pool.find_mut(record.impi) {
            parent.impu_list.retain(|&h| h != impu);
        }
        log::debug!("IMPU removed: {}", record.id);
    }

    pub fn impu_remove_all(&mut self, impi: PoolHandle) {
        let children = match self.impi_pool.find_mut(impi) {
            Some(parent) => std::mem::take(&mut parent.impu_list),
            None => return,
        };
        for impu in children {
            self.impu_pool.free(impu);
        }
    }

    pub fn impu_find_by_id(&self, impi: PoolHandle, id: &str) -> Option<PoolHandle> {
        self.impi(impi)?
            .impu_list
            .iter()
            .copied()
            .find(|&h| self.impu(h).is_some_and(|impu| impu.id == id))
    }

    /// Check that the hash, the IMPI list and the back-references agree
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        assert_eq!(self.impi_hash.len(), self.impi_list.len());
        assert_eq!(self.impi_pool.allocated(), self.impi_list.len());

        let mut children = 0;
        for &h in &self.impi_list {
            let impi = self.impi(h).expect("listed IMPI is live");
            assert_eq!(self.impi_hash.get(&impi.id), Some(&h));
            for &c in &impi.impu_list {
                let impu = self.impu(c).expect("listed IMPU is live");
                assert_eq!(impu.impi, h);
                children += 1;
            }
        }
        assert_eq!(children, self.impu_pool.allocated());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impi_add_find_remove() {
        let mut registry = IdentityRegistry::new(8, 8);

        let impi = registry.impi_add("user@ims.example.com").unwrap();
        assert_eq!(registry.impi_find_by_id("user@ims.example.com"), Some(impi));
        assert_eq!(registry.impi_count(), 1);

        registry.impi_remove(impi);
        assert!(registry.impi_find_by_id("user@ims.example.com").is_none());
        assert!(registry.impi(impi).is_none());
        assert_eq!(registry.impi_count(), 0);
        registry.assert_consistent();
    }

    #[test]
    fn test_impu_scoped_to_impi() {
        let mut registry = IdentityRegistry::new(8, 8);
        let a = registry.impi_add("a").unwrap();
        let b = registry.impi_add("b").unwrap();

        let xa = registry.impu_add(a, "sip:x").unwrap();
        let xb = registry.impu_add(b, "sip:x").unwrap();
        assert_ne!(xa, xb);
        assert_eq!(registry.impu_find_by_id(a, "sip:x"), Some(xa));
        assert_eq!(registry.impu_find_by_id(b, "sip:x"), Some(xb));
        assert_eq!(registry.impu(xb).unwrap().impi, b);
        registry.assert_consistent();
    }

    #[test]
    fn test_impi_remove_cascades() {
        let mut registry = IdentityRegistry::new(8, 8);
        let impi = registry.impi_add("user").unwrap();
        let first = registry.impu_add(impi, "sip:1").unwrap();
        let second = registry.impu_add(impi, "tel:+1").unwrap();
        assert_eq!(registry.impu_count(), 2);

        registry.impi_remove(impi);
        assert_eq!(registry.impu_count(), 0);
        assert!(registry.impu(first).is_none());
        assert!(registry.impu(second).is_none());
        registry.assert_consistent();
    }

    #[test]
    fn test_impu_remove_unlinks() {
        let mut registry = IdentityRegistry::new(8, 8);
        let impi = registry.impi_add("user").unwrap();
        let first = registry.impu_add(impi, "sip:1").unwrap();
        let second = registry.impu_add(impi, "sip:2").unwrap();

        registry.impu_remove(first);
        assert_eq!(registry.impi(impi).unwrap().impu_list, vec![second]);
        assert!(registry.impu_find_by_id(impi, "sip:1").is_none());

        // Stale handle is ignored
        registry.impu_remove(first);
        assert_eq!(registry.impu_count(), 1);
        registry.assert_consistent();
    }

    #[test]
    fn test_impu_add_under_released_impi() {
        let mut registry = IdentityRegistry::new(1, 8);
        let impi = registry.impi_add("user").unwrap();
        registry.impi_remove(impi);

        assert!(matches!(
            registry.impu_add(impi, "sip:1"),
            Err(HssError::StaleHandle("impi"))
        ));
        assert_eq!(registry.impu_count(), 0);

        // The slot is reused by a new IMPI; the old handle stays stale
        let other = registry.impi_add("other").unwrap();
        assert_eq!(other.index(), impi.index());
        assert!(registry.impu_add(impi, "sip:1").is_err());
        registry.impu_add(other, "sip:1").unwrap();
        registry.assert_consistent();
    }

    #[test]
    fn test_impi_get_server_name_order() {
        let mut registry = IdentityRegistry::new(8, 8);
        let impi = registry.impi_add("user").unwrap();
        let first = registry.impu_add(impi, "sip:1").unwrap();
        let second = registry.impu_add(impi, "sip:2").unwrap();
        let third = registry.impu_add(impi, "sip:3").unwrap();
        assert!(registry.impi_get_server_name(impi).is_none());

        registry.impu_mut(third).unwrap().server_name = Some("scscf-3".to_string());
        registry.impu_mut(second).unwrap().server_name = Some("scscf-2".to_string());
        assert_eq!(registry.impi_get_server_name(impi), Some("scscf-2"));

        registry.impu_mut(first).unwrap().server_name = Some("scscf-1".to_string());
        assert_eq!(registry.impi_get_server_name(impi), Some("scscf-1"));
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut registry = IdentityRegistry::new(1, 1);
        let impi = registry.impi_add("user").unwrap();
        registry.impu_add(impi, "sip:1").unwrap();

        assert!(matches!(
            registry.impi_add("other"),
            Err(HssError::ResourceExhausted { ref pool, capacity: 1 }) if pool == "impi"
        ));
        assert!(matches!(
            registry.impu_add(impi, "sip:2"),
            Err(HssError::ResourceExhausted { ref pool, capacity: 1 }) if pool == "impu"
        ));
        assert_eq!(registry.impi_ids(), vec!["user".to_string()]);
        registry.assert_consistent();
    }

    #[test]
    fn test_impi_remove_all() {
        let mut registry = IdentityRegistry::new(4, 8);
        for user in ["u1", "u2", "u3"] {
            let impi = registry.impi_add(user).unwrap();
            registry.impu_add(impi, &format!("sip:{user}")).unwrap();
            registry.impu_add(impi, &format!("tel:{user}")).unwrap();
        }
        assert_eq!(registry.impi_ids(), vec!["u1", "u2", "u3"]);

        registry.impi_remove_all();
        assert_eq!(registry.impi_count(), 0);
        assert_eq!(registry.impu_count(), 0);
        registry.assert_consistent();

        // Slots are reusable afterwards
        let impi = registry.impi_add("u1").unwrap();
        registry.impu_add(impi, "sip:u1").unwrap();
        registry.assert_consistent();
    }
}
