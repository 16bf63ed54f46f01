//! Property-Based Tests for Database Interface
//!
//! SUPI handling and SQN arithmetic of the in-memory backend.

use proptest::prelude::*;

use crate::memory::MemoryDbi;
use crate::subscription::OgsDbiAuthInfo;
use crate::types::*;
use crate::SubscriberDb;

// Strategy for generating valid IMSI strings (15 digits)
fn imsi_strategy() -> impl Strategy<Value = String> {
    "[0-9]{15}".prop_map(|s| s)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// SUPI built from an IMSI splits back into ("imsi", imsi)
    #[test]
    fn prop_supi_roundtrip(imsi in imsi_strategy()) {
        let supi = ogs_supi_from_imsi(&imsi);
        prop_assert_eq!(ogs_id_get_type(&supi), Some(OGS_ID_SUPI_TYPE_IMSI));
        prop_assert_eq!(ogs_id_get_value(&supi), Some(imsi.as_str()));
    }

    /// SQN stays within 48 bits and advances by 32 modulo 2^48
    #[test]
    fn prop_increment_sqn(imsi in imsi_strategy(), start in any::<u64>(), steps in 0..20usize) {
        let db = MemoryDbi::new();
        let supi = ogs_supi_from_imsi(&imsi);
        db.insert(&supi, OgsDbiAuthInfo::default(), OgsSubscriptionData::default()).unwrap();

        db.update_sqn(&supi, start).unwrap();
        let mut expected = start & OGS_MAX_SQN;
        for _ in 0..steps {
            db.increment_sqn(&supi).unwrap();
            expected = (expected + OGS_SQN_INCREMENT) & OGS_MAX_SQN;
        }

        let sqn = db.auth_info(&supi).unwrap().sqn;
        prop_assert!(sqn <= OGS_MAX_SQN);
        prop_assert_eq!(sqn, expected);
    }
}
