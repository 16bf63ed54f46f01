//! Database Interface Types
//!
//! Common types and constants used throughout the database interface.

use serde::{Deserialize, Serialize};

// Key lengths (from ogs-crypt.h)
pub const OGS_KEY_LEN: usize = 16;
pub const OGS_AMF_LEN: usize = 2;
pub const OGS_RAND_LEN: usize = 16;
pub const OGS_MAX_SQN: u64 = 0xFFFFFFFFFFFF; // 48-bit max

/// SQN step applied by `increment_sqn`
pub const OGS_SQN_INCREMENT: u64 = 32;

// Array limits
pub const OGS_MAX_NUM_OF_MSISDN: usize = 2;

/// SUPI type prefix for IMSI
pub const OGS_ID_SUPI_TYPE_IMSI: &str = "imsi";

// MongoDB field names
pub const OGS_IMSI_STRING: &str = "imsi";
pub const OGS_MSISDN_STRING: &str = "msisdn";
pub const OGS_SECURITY_STRING: &str = "security";
pub const OGS_K_STRING: &str = "k";
pub const OGS_OPC_STRING: &str = "opc";
pub const OGS_OP_STRING: &str = "op";
pub const OGS_AMF_STRING: &str = "amf";
pub const OGS_RAND_STRING: &str = "rand";
pub const OGS_SQN_STRING: &str = "sqn";
pub const OGS_MME_HOST_STRING: &str = "mme_host";
pub const OGS_MME_REALM_STRING: &str = "mme_realm";
pub const OGS_PURGE_FLAG_STRING: &str = "purge_flag";
pub const OGS_ACCESS_RESTRICTION_DATA_STRING: &str = "access_restriction_data";
pub const OGS_SUBSCRIBER_STATUS_STRING: &str = "subscriber_status";
pub const OGS_OPERATOR_DETERMINED_BARRING_STRING: &str = "operator_determined_barring";
pub const OGS_NETWORK_ACCESS_MODE_STRING: &str = "network_access_mode";
pub const OGS_SUBSCRIBED_RAU_TAU_TIMER_STRING: &str = "subscribed_rau_tau_timer";
pub const OGS_AMBR_STRING: &str = "ambr";
pub const OGS_DOWNLINK_STRING: &str = "downlink";
pub const OGS_UPLINK_STRING: &str = "uplink";
pub const OGS_VALUE_STRING: &str = "value";
pub const OGS_UNIT_STRING: &str = "unit";

/// MSISDN data structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgsMsisdn {
    pub buf: Vec<u8>,
    pub bcd: String,
}

impl OgsMsisdn {
    pub fn from_bcd(bcd: &str) -> Self {
        let mut buf = Vec::new();
        ogs_bcd_to_buffer(bcd, &mut buf);
        Self {
            buf,
            bcd: bcd.to_string(),
        }
    }
}

/// AMBR (Aggregate Maximum Bit Rate), bits per second
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgsAmbr {
    pub downlink: u64,
    pub uplink: u64,
}

/// Subscription profile of one subscriber
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgsSubscriptionData {
    pub imsi: Option<String>,
    pub msisdn: Vec<OgsMsisdn>,
    pub access_restriction_data: i32,
    pub subscriber_status: i32,
    pub operator_determined_barring: i32,
    pub network_access_mode: i32,
    pub subscribed_rau_tau_timer: i32,
    pub ambr: OgsAmbr,
    pub mme_host: Option<String>,
    pub mme_realm: Option<String>,
    pub purge_flag: bool,
}

impl OgsSubscriptionData {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Build the SUPI for an IMSI ("imsi-<bcd>")
pub fn ogs_supi_from_imsi(imsi_bcd: &str) -> String {
    format!("{OGS_ID_SUPI_TYPE_IMSI}-{imsi_bcd}")
}

/// Convert a BCD digit string to packed nibbles (odd length padded with 0xF)
pub fn ogs_bcd_to_buffer(bcd: &str, buf: &mut Vec<u8>) -> usize {
    buf.clear();
    let digits: Vec<u8> = bcd
        .chars()
        .map(|c| c.to_digit(16).unwrap_or(0) as u8)
        .collect();

    for pair in digits.chunks(2) {
        let high = pair[0];
        let low = pair.get(1).copied().unwrap_or(0xF);
        buf.push((high << 4) | low);
    }

    buf.len()
}

/// SUPI type (e.g., "imsi" from "imsi-123456789012345")
pub fn ogs_id_get_type(supi: &str) -> Option<&str> {
    supi.split_once('-')
        .map(|(supi_type, _)| supi_type)
        .filter(|supi_type| !supi_type.is_empty())
}

/// SUPI value (e.g., "123456789012345" from "imsi-123456789012345")
pub fn ogs_id_get_value(supi: &str) -> Option<&str> {
    supi.split_once('-')
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Convert a hex string to bytes, returning the number of bytes written
pub fn ogs_ascii_to_hex(ascii: &str, buf: &mut [u8]) -> usize {
    let bytes: Vec<u8> = (0..ascii.len())
        .step_by(2)
        .filter_map(|i| {
            ascii.get(i..i + 2)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
        })
        .collect();

    let len = bytes.len().min(buf.len());
    buf[..len].copy_from_slice(&bytes[..len]);
    len
}
