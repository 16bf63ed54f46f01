//! NextGCore HSS (Home Subscriber Server) Library
//!
//! IMS side of the HSS:
//! - IMPI/IMPU registry and S-CSCF bindings for the Cx interface
//! - Cx request handling (UAR, SAR, LIR)
//! - Subscriber database access for authentication (SQN bookkeeping)

pub mod config;
pub mod context;
pub mod cx_path;
pub mod error;
pub mod registry;


// Re-export commonly used types
pub use config::{DiamConfig, HssConfig, PoolConfig};
pub use context::{HssContext, ServerNameUpdate};
pub use cx_path::{
    handle_lir, handle_sar, handle_uar, CxResult, CxStats, ServerAssignmentType,
    UserAuthorizationType,
};
pub use error::{HssError, HssResult};
pub use registry::{HssImpi, HssImpu, IdentityRegistry};
