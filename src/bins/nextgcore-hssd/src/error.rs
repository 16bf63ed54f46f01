//! HSS error types

use ogs_core::PoolError;
use ogs_dbi::DbiError;
use thiserror::Error;

/// HSS error type
#[derive(Error, Debug)]
pub enum HssError {
    /// An identity pool is full; the deployment's pool sizing is wrong
    #[error("{pool} pool exhausted (capacity {capacity})")]
    ResourceExhausted { pool: String, capacity: usize },

    /// Server-name query or update on a pair that was never associated
    #[error("identities not associated: {user_name} / {public_identity}")]
    IdentityNotAssociated {
        user_name: String,
        public_identity: String,
    },

    /// A registry handle outlived the record it pointed to
    #[error("stale {0} handle")]
    StaleHandle(&'static str),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Db(#[from] DbiError),
}

impl From<PoolError> for HssError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted { name, capacity } => HssError::ResourceExhausted {
                pool: name,
                capacity,
            },
        }
    }
}

/// HSS result type
pub type HssResult<T> = Result<T, HssError>;
