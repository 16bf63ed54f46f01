//! Subscription Documents
//!
//! Decoding of subscriber documents into authentication and subscription data.

use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::mongoc::{DbiError, DbiResult};
use crate::types::*;

/// Authentication information from database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgsDbiAuthInfo {
    pub k: [u8; OGS_KEY_LEN],
    pub use_opc: bool,
    pub opc: [u8; OGS_KEY_LEN],
    pub op: [u8; OGS_KEY_LEN],
    pub amf: [u8; OGS_AMF_LEN],
    pub rand: [u8; OGS_RAND_LEN],
    pub sqn: u64,
}

/// Decode the `security` sub-document of a subscriber
pub fn parse_auth_info(document: &Document) -> DbiResult<OgsDbiAuthInfo> {
    let security = document
        .get_document(OGS_SECURITY_STRING)
        .map_err(|_| DbiError::FieldNotFound(OGS_SECURITY_STRING.to_string()))?;

    let mut auth_info = OgsDbiAuthInfo::default();

    if let Ok(k_str) = security.get_str(OGS_K_STRING) {
        ogs_ascii_to_hex(k_str, &mut auth_info.k);
    }
    if let Ok(opc_str) = security.get_str(OGS_OPC_STRING) {
        auth_info.use_opc = true;
        ogs_ascii_to_hex(opc_str, &mut auth_info.opc);
    }
    if let Ok(op_str) = security.get_str(OGS_OP_STRING) {
        ogs_ascii_to_hex(op_str, &mut auth_info.op);
    }
    if let Ok(amf_str) = security.get_str(OGS_AMF_STRING) {
        ogs_ascii_to_hex(amf_str, &mut auth_info.amf);
    }
    if let Ok(rand_str) = security.get_str(OGS_RAND_STRING) {
        ogs_ascii_to_hex(rand_str, &mut auth_info.rand);
    }

    // Stored as int64 by the WebUI, int32 by older provisioning scripts
    match security.get(OGS_SQN_STRING) {
        Some(Bson::Int64(sqn)) => auth_info.sqn = (*sqn as u64) & OGS_MAX_SQN,
        Some(Bson::Int32(sqn)) => auth_info.sqn = (*sqn as u64) & OGS_MAX_SQN,
        _ => {}
    }

    Ok(auth_info)
}

/// Decode a subscriber document into its subscription profile
pub fn parse_subscription_data(document: &Document) -> OgsSubscriptionData {
    let mut subscription_data = OgsSubscriptionData::new();

    if let Ok(imsi) = document.get_str(OGS_IMSI_STRING) {
        subscription_data.imsi = Some(imsi.to_string());
    }

    if let Ok(msisdn_array) = document.get_array(OGS_MSISDN_STRING) {
        subscription_data.msisdn = msisdn_array
            .iter()
            .filter_map(|value| match value {
                Bson::String(bcd) => Some(OgsMsisdn::from_bcd(bcd)),
                _ => None,
            })
            .take(OGS_MAX_NUM_OF_MSISDN)
            .collect();
    }

    if let Ok(ard) = document.get_i32(OGS_ACCESS_RESTRICTION_DATA_STRING) {
        subscription_data.access_restriction_data = ard;
    }
    if let Ok(ss) = document.get_i32(OGS_SUBSCRIBER_STATUS_STRING) {
        subscription_data.subscriber_status = ss;
    }
    if let Ok(odb) = document.get_i32(OGS_OPERATOR_DETERMINED_BARRING_STRING) {
        subscription_data.operator_determined_barring = odb;
    }
    if let Ok(nam) = document.get_i32(OGS_NETWORK_ACCESS_MODE_STRING) {
        subscription_data.network_access_mode = nam;
    }
    if let Ok(timer) = document.get_i32(OGS_SUBSCRIBED_RAU_TAU_TIMER_STRING) {
        subscription_data.subscribed_rau_tau_timer = timer;
    }

    if let Ok(ambr_doc) = document.get_document(OGS_AMBR_STRING) {
        subscription_data.ambr = parse_ambr(ambr_doc);
    }

    if let Ok(mme_host) = document.get_str(OGS_MME_HOST_STRING) {
        subscription_data.mme_host = Some(mme_host.to_string());
    }
    if let Ok(mme_realm) = document.get_str(OGS_MME_REALM_STRING) {
        subscription_data.mme_realm = Some(mme_realm.to_string());
    }
    if let Ok(purge_flag) = document.get_bool(OGS_PURGE_FLAG_STRING) {
        subscription_data.purge_flag = purge_flag;
    }

    subscription_data
}

/// `{ value, unit }` where unit is a power of 1000 (0 = bps, 1 = Kbps, ...)
fn parse_bitrate(doc: &Document) -> u64 {
    let value = doc.get_i32(OGS_VALUE_STRING).unwrap_or(0).max(0) as u64;
    let unit = doc.get_i32(OGS_UNIT_STRING).unwrap_or(0).clamp(0, 4) as u32;
    value.saturating_mul(1000u64.pow(unit))
}

fn parse_ambr(doc: &Document) -> OgsAmbr {
    let mut ambr = OgsAmbr::default();

    if let Ok(downlink_doc) = doc.get_document(OGS_DOWNLINK_STRING) {
        ambr.downlink = parse_bitrate(downlink_doc);
    }
    if let Ok(uplink_doc) = doc.get_document(OGS_UPLINK_STRING) {
        ambr.uplink = parse_bitrate(uplink_doc);
    }

    ambr
}
