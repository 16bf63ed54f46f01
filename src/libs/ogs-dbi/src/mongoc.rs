//! MongoDB Interface
//!
//! Connection management and the MongoDB-backed [`SubscriberDb`].

use mongodb::{
    bson::{doc, Document},
    sync::{Client, Collection},
};
use thiserror::Error;

use crate::subscription::{parse_auth_info, parse_subscription_data, OgsDbiAuthInfo};
use crate::types::*;
use crate::SubscriberDb;

/// Database interface error types
#[derive(Error, Debug)]
pub enum DbiError {
    #[error("MongoDB error: {0}")]
    MongoDb(#[from] mongodb::error::Error),
    #[error("No database URI provided")]
    NoDbUri,
    #[error("Invalid SUPI format: {0}")]
    InvalidSupi(String),
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(String),
    #[error("Field not found: {0}")]
    FieldNotFound(String),
    #[error("Retry needed")]
    Retry,
}

/// Result type for database operations
pub type DbiResult<T> = Result<T, DbiError>;

/// Split a SUPI into its (type, value) pair
pub(crate) fn split_supi(supi: &str) -> DbiResult<(&str, &str)> {
    let supi_type = ogs_id_get_type(supi).ok_or_else(|| DbiError::InvalidSupi(supi.to_string()))?;
    let supi_id = ogs_id_get_value(supi).ok_or_else(|| DbiError::InvalidSupi(supi.to_string()))?;
    Ok((supi_type, supi_id))
}

/// Mask credentials in database URI for logging
fn masked_db_uri(db_uri: &str) -> String {
    match db_uri.rfind('@') {
        Some(at_pos) => format!("mongodb://*****:*****@{}", &db_uri[at_pos + 1..]),
        None => db_uri.to_string(),
    }
}

/// MongoDB subscriber database
pub struct MongoDbi {
    masked_db_uri: String,
    collection: Collection<Document>,
}

impl MongoDbi {
    /// Connect to `db_uri` and bind the `subscribers` collection of `db_name`
    ///
    /// Returns `DbiError::Retry` when the server does not answer a ping.
    pub fn connect(db_uri: &str, db_name: &str) -> DbiResult<Self> {
        if db_uri.is_empty() {
            log::error!("No DB_URI");
            return Err(DbiError::NoDbUri);
        }
        let masked_db_uri = masked_db_uri(db_uri);

        let client = Client::with_uri_str(db_uri)?;
        let database = client.database(db_name);

        if let Err(e) = database.run_command(doc! { "ping": 1 }, None) {
            log::warn!("Failed to connect to server [{masked_db_uri}]: {e}");
            return Err(DbiError::Retry);
        }
        log::info!("MongoDB URI: '{masked_db_uri}'");

        Ok(Self {
            masked_db_uri,
            collection: database.collection::<Document>("subscribers"),
        })
    }

    /// Database URI with credentials masked
    pub fn masked_db_uri(&self) -> &str {
        &self.masked_db_uri
    }

    fn find_subscriber(&self, supi: &str) -> DbiResult<Document> {
        let (supi_type, supi_id) = split_supi(supi)?;
        self.collection
            .find_one(doc! { supi_type: supi_id }, None)?
            .ok_or_else(|| DbiError::SubscriberNotFound(supi.to_string()))
    }
}

impl SubscriberDb for MongoDbi {
    fn auth_info(&self, supi: &str) -> DbiResult<OgsDbiAuthInfo> {
        let document = self.find_subscriber(supi)?;
        parse_auth_info(&document)
    }

    fn update_sqn(&self, supi: &str, sqn: u64) -> DbiResult<()> {
        let (supi_type, supi_id) = split_supi(supi)?;
        let update = doc! {
            "$set": {
                format!("{OGS_SECURITY_STRING}.{OGS_SQN_STRING}"): (sqn & OGS_MAX_SQN) as i64
            }
        };

        self.collection
            .update_one(doc! { supi_type: supi_id }, update, None)?;
        Ok(())
    }

    fn increment_sqn(&self, supi: &str) -> DbiResult<()> {
        let (supi_type, supi_id) = split_supi(supi)?;
        let query = doc! { supi_type: supi_id };
        let field = format!("{OGS_SECURITY_STRING}.{OGS_SQN_STRING}");

        let update_inc = doc! { "$inc": { field.clone(): OGS_SQN_INCREMENT as i64 } };
        self.collection.update_one(query.clone(), update_inc, None)?;

        // Wrap at 48 bits
        let update_bit = doc! { "$bit": { field: { "and": OGS_MAX_SQN as i64 } } };
        self.collection.update_one(query, update_bit, None)?;

        Ok(())
    }

    fn subscription_data(&self, supi: &str) -> DbiResult<OgsSubscriptionData> {
        let document = self.find_subscriber(supi)?;
        Ok(parse_subscription_data(&document))
    }
}
