//! HSS Configuration
//!
//! Loads the `hss` section (and the few global keys the HSS needs) from the
//! NextGCore YAML file:
//!
//! ```yaml
//! db_uri: mongodb://localhost/nextgcore
//! global:
//!   max:
//!     ue: 1024
//! hss:
//!   freeDiameter:
//!     identity: hss.localdomain
//!     realm: localdomain
//!     listen_on: 127.0.0.8
//!     load_extension:
//!       - module: dbg_msg_dumps.fdx
//!         conf: 0x8888
//!     connect:
//!       - identity: mme.localdomain
//!         addr: 127.0.0.2
//! ```
//!
//! `freeDiameter` may instead be a scalar naming an external freeDiameter
//! configuration file, in which case the inline identity is not required.

use std::path::Path;

use serde_yaml::Value;

use crate::error::{HssError, HssResult};

/// Diameter port (RFC 6733)
pub const DIAMETER_PORT: u16 = 3868;
/// Diameter over TLS/DTLS port (RFC 6733)
pub const DIAMETER_SECURE_PORT: u16 = 5868;

/// Default number of UEs when `global.max.ue` is absent
pub const DEFAULT_MAX_UE: usize = 1024;
/// IMPUs provisioned per UE
pub const IMPU_PER_UE: usize = 4;

/// Identity pool capacities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub impi: usize,
    pub impu: usize,
}

impl PoolConfig {
    pub fn from_max_ue(max_ue: usize) -> Self {
        Self {
            impi: max_ue,
            impu: max_ue.saturating_mul(IMPU_PER_UE),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_max_ue(DEFAULT_MAX_UE)
    }
}

/// Diameter extension (`load_extension`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiamExtension {
    pub module: String,
    pub conf: Option<String>,
}

/// Diameter peer (`connect`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiamConnection {
    pub identity: String,
    pub addr: String,
    /// 0 selects the default port
    pub port: u16,
}

/// Inline freeDiameter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiamConfig {
    pub identity: Option<String>,
    pub realm: Option<String>,
    pub listen_on: Option<String>,
    pub port: u16,
    pub sec_port: u16,
    pub no_fwd: bool,
    pub extensions: Vec<DiamExtension>,
    pub connections: Vec<DiamConnection>,
}

impl Default for DiamConfig {
    fn default() -> Self {
        Self {
            identity: None,
            realm: None,
            listen_on: None,
            port: DIAMETER_PORT,
            sec_port: DIAMETER_SECURE_PORT,
            no_fwd: false,
            extensions: Vec::new(),
            connections: Vec::new(),
        }
    }
}

/// HSS configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HssConfig {
    /// External freeDiameter configuration file
    pub diam_conf_path: Option<String>,
    pub diam_config: DiamConfig,
    /// SMS over IMS server name
    pub sms_over_ims: Option<String>,
    pub use_mongodb_change_stream: bool,
    pub pool: PoolConfig,
    pub db_uri: Option<String>,
}

impl HssConfig {
    /// Read and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> HssResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        log::info!("Loading configuration from {}", path.display());
        Self::from_yaml_str(&content)
    }

    /// Parse configuration text and validate it
    pub fn from_yaml_str(yaml_str: &str) -> HssResult<Self> {
        let root: Value = serde_yaml::from_str(yaml_str)?;
        let mut config = HssConfig::default();

        if let Some(max_ue) = root
            .get("global")
            .and_then(|global| global.get("max"))
            .and_then(|max| max.get("ue"))
            .and_then(Value::as_u64)
        {
            config.pool = PoolConfig::from_max_ue(max_ue as usize);
        }

        if let Some(db_uri) = root.get("db_uri").and_then(Value::as_str) {
            config.db_uri = Some(db_uri.to_string());
        }

        if let Some(hss) = root.get("hss").and_then(Value::as_mapping) {
            for (key, value) in hss {
                match key.as_str() {
                    Some("freeDiameter") => config.parse_freediameter(value)?,
                    Some("sms_over_ims") => config.sms_over_ims = scalar_string(value),
                    Some("use_mongodb_change_stream") => {
                        config.use_mongodb_change_stream = value.as_bool().unwrap_or(false)
                    }
                    _ => log::warn!("unknown key `{}`", key_name(key)),
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn parse_freediameter(&mut self, value: &Value) -> HssResult<()> {
        if let Some(path) = value.as_str() {
            self.diam_conf_path = Some(path.to_string());
            return Ok(());
        }
        let Some(fd) = value.as_mapping() else {
            return Err(HssError::ConfigInvalid(
                "hss.freeDiameter must be a path or a mapping".to_string(),
            ));
        };

        let diam = &mut self.diam_config;
        for (key, value) in fd {
            match key.as_str() {
                Some("identity") => diam.identity = scalar_string(value),
                Some("realm") => diam.realm = scalar_string(value),
                Some("listen_on") => diam.listen_on = scalar_string(value),
                Some("port") => diam.port = parse_port("port", value)?,
                Some("sec_port") => diam.sec_port = parse_port("sec_port", value)?,
                Some("no_fwd") => diam.no_fwd = value.as_bool().unwrap_or(false),
                Some("load_extension") => {
                    for ext in mapping_entries(value) {
                        if let Some(extension) = parse_extension(ext) {
                            diam.extensions.push(extension);
                        }
                    }
                }
                Some("connect") => {
                    for conn in mapping_entries(value) {
                        if let Some(connection) = parse_connection(conn)? {
                            diam.connections.push(connection);
                        }
                    }
                }
                _ => log::warn!("unknown key `{}`", key_name(key)),
            }
        }
        Ok(())
    }

    /// Without an external freeDiameter file the inline identity, realm and
    /// listen address are mandatory
    pub fn validate(&self) -> HssResult<()> {
        let diam = &self.diam_config;
        if self.diam_conf_path.is_none()
            && (diam.identity.is_none() || diam.realm.is_none() || diam.listen_on.is_none())
        {
            return Err(HssError::ConfigInvalid(
                "No hss.freeDiameter identity/realm/listen_on".to_string(),
            ));
        }
        Ok(())
    }
}

/// Entries of a node that is either one mapping or a sequence of mappings
fn mapping_entries(value: &Value) -> Vec<&serde_yaml::Mapping> {
    match value {
        Value::Mapping(mapping) => vec![mapping],
        Value::Sequence(seq) => seq.iter().filter_map(Value::as_mapping).collect(),
        _ => Vec::new(),
    }
}

fn parse_extension(ext: &serde_yaml::Mapping) -> Option<DiamExtension> {
    let mut module = None;
    let mut conf = None;
    for (key, value) in ext {
        match key.as_str() {
            Some("module") => module = scalar_string(value),
            Some("conf") => conf = scalar_string(value),
            _ => log::warn!("unknown key `{}`", key_name(key)),
        }
    }
    Some(DiamExtension { module: module?, conf })
}

fn parse_connection(conn: &serde_yaml::Mapping) -> HssResult<Option<DiamConnection>> {
    let mut identity = None;
    let mut addr = None;
    let mut port = 0;
    for (key, value) in conn {
        match key.as_str() {
            Some("identity") => identity = scalar_string(value),
            Some("addr") => addr = scalar_string(value),
            Some("port") => port = parse_port("connect.port", value)?,
            _ => log::warn!("unknown key `{}`", key_name(key)),
        }
    }
    Ok(identity
        .zip(addr)
        .map(|(identity, addr)| DiamConnection { identity, addr, port }))
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_port(name: &str, value: &Value) -> HssResult<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    };
    port.and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| HssError::ConfigInvalid(format!("invalid {name}: {value:?}")))
}

fn key_name(key: &Value) -> String {
    scalar_string(key).unwrap_or_else(|| format!("{key:?}"))
}
