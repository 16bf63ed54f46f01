//! HSS Cx Diameter Path
//!
//! Cx request handlers for IMS registration: UAR (User-Authorization-Request),
//! SAR (Server-Assignment-Request) and LIR (Location-Info-Request). Requests
//! arrive already decoded; answers are returned as plain structs for the
//! Diameter layer to encode.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::{HssContext, ServerNameUpdate};
use crate::error::HssError;

/// Base result codes
pub const OGS_DIAM_SUCCESS: u32 = 2001;
pub const OGS_DIAM_UNABLE_TO_COMPLY: u32 = 5012;

/// Cx experimental result codes
pub const OGS_DIAM_CX_FIRST_REGISTRATION: u32 = 2001;
pub const OGS_DIAM_CX_SUBSEQUENT_REGISTRATION: u32 = 2002;
pub const OGS_DIAM_CX_UNREGISTERED_SERVICE: u32 = 2003;
pub const OGS_DIAM_CX_ERROR_IDENTITIES_DONT_MATCH: u32 = 5002;
pub const OGS_DIAM_CX_ERROR_IDENTITY_NOT_REGISTERED: u32 = 5003;
pub const OGS_DIAM_CX_ERROR_IDENTITY_ALREADY_REGISTERED: u32 = 5005;

/// Server-Assignment-Type AVP values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAssignmentType {
    NoAssignment = 0,
    Registration = 1,
    ReRegistration = 2,
    UnregisteredUser = 3,
    TimeoutDeregistration = 4,
    UserDeregistration = 5,
    TimeoutDeregistrationStoreServerName = 6,
    UserDeregistrationStoreServerName = 7,
    AdministrativeDeregistration = 8,
    AuthenticationFailure = 9,
    AuthenticationTimeout = 10,
    DeregistrationTooMuchData = 11,
}

impl From<u32> for ServerAssignmentType {
    fn from(value: u32) -> Self {
        match value {
            1 => ServerAssignmentType::Registration,
            2 => ServerAssignmentType::ReRegistration,
            3 => ServerAssignmentType::UnregisteredUser,
            4 => ServerAssignmentType::TimeoutDeregistration,
            5 => ServerAssignmentType::UserDeregistration,
            6 => ServerAssignmentType::TimeoutDeregistrationStoreServerName,
            7 => ServerAssignmentType::UserDeregistrationStoreServerName,
            8 => ServerAssignmentType::AdministrativeDeregistration,
            9 => ServerAssignmentType::AuthenticationFailure,
            10 => ServerAssignmentType::AuthenticationTimeout,
            11 => ServerAssignmentType::DeregistrationTooMuchData,
            _ => ServerAssignmentType::NoAssignment,
        }
    }
}

impl ServerAssignmentType {
    /// Registration types take over the binding from any previous S-CSCF
    pub fn is_registration(self) -> bool {
        matches!(
            self,
            ServerAssignmentType::Registration | ServerAssignmentType::ReRegistration
        )
    }
}

/// User-Authorization-Type AVP values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAuthorizationType {
    Registration = 0,
    DeRegistration = 1,
    RegistrationAndCapabilities = 2,
}

impl From<u32> for UserAuthorizationType {
    fn from(value: u32) -> Self {
        match value {
            1 => UserAuthorizationType::DeRegistration,
            2 => UserAuthorizationType::RegistrationAndCapabilities,
            _ => UserAuthorizationType::Registration,
        }
    }
}

/// Cx interface Diameter statistics
#[derive(Debug, Default)]
pub struct CxStats {
    pub rx_uar: AtomicU64,
    pub rx_uar_error: AtomicU64,
    pub rx_sar: AtomicU64,
    pub rx_sar_error: AtomicU64,
    pub rx_lir: AtomicU64,
    pub rx_lir_error: AtomicU64,
    pub tx_uaa: AtomicU64,
    pub tx_saa: AtomicU64,
    pub tx_lia: AtomicU64,
}

fn inc(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn get(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl fmt::Display for CxStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[CX] RX UAR:{} ({} err) SAR:{} ({} err) LIR:{} ({} err) TX UAA:{} SAA:{} LIA:{}",
            get(&self.rx_uar),
            get(&self.rx_uar_error),
            get(&self.rx_sar),
            get(&self.rx_sar_error),
            get(&self.rx_lir),
            get(&self.rx_lir_error),
            get(&self.tx_uaa),
            get(&self.tx_saa),
            get(&self.tx_lia),
        )
    }
}

/// Server-Capabilities grouped AVP
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServerCapabilities {
    pub mandatory_capability: Vec<u32>,
    pub optional_capability: Vec<u32>,
    pub server_name: Vec<String>,
}

/// Answer outcome: exactly one of Result-Code and Experimental-Result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CxResult {
    Base(u32),
    Experimental(u32),
}

impl CxResult {
    pub fn code(self) -> u32 {
        match self {
            CxResult::Base(code) | CxResult::Experimental(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        (2000..3000).contains(&self.code())
    }
}

/// User-Authorization-Answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UaaMessage {
    pub result: CxResult,
    /// Assigned S-CSCF
    pub server_name: Option<String>,
    pub server_capabilities: Option<ServerCapabilities>,
}

/// Server-Assignment-Answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaaMessage {
    pub result: CxResult,
    /// S-CSCF bound after the request
    pub server_name: Option<String>,
}

/// Location-Info-Answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiaMessage {
    pub result: CxResult,
    pub server_name: Option<String>,
    pub server_capabilities: Option<ServerCapabilities>,
}

// Any registry failure on the answer path leaves the request unserved.
fn unable_to_comply(user_name: &str, err: &HssError) -> CxResult {
    log::error!("[{user_name}] {err}");
    CxResult::Base(OGS_DIAM_UNABLE_TO_COMPLY)
}

/// Handle User-Authorization-Request (UAR)
///
/// Sent by the I-CSCF when a user registers. Registration requests associate
/// the identities; the answer carries the serving S-CSCF when one is known,
/// otherwise the capabilities the I-CSCF needs to select one.
pub fn handle_uar(
    ctx: &HssContext,
    user_name: &str,
    public_identity: &str,
    authorization_type: UserAuthorizationType,
) -> UaaMessage {
    log::debug!("[{user_name}] Rx UAR for {public_identity} (type={authorization_type:?})");
    let stats = ctx.cx_stats();
    inc(&stats.rx_uar);

    let answer = uar_answer(ctx, user_name, public_identity, authorization_type);
    if !answer.result.is_success() {
        inc(&stats.rx_uar_error);
    }

    inc(&stats.tx_uaa);
    answer
}

fn uar_answer(
    ctx: &HssContext,
    user_name: &str,
    public_identity: &str,
    authorization_type: UserAuthorizationType,
) -> UaaMessage {
    let failure = |result| UaaMessage {
        result,
        server_name: None,
        server_capabilities: None,
    };

    if authorization_type == UserAuthorizationType::DeRegistration {
        return match ctx.cx_get_server_name(user_name, public_identity) {
            Ok(Some(server_name)) => UaaMessage {
                result: CxResult::Base(OGS_DIAM_SUCCESS),
                server_name: Some(server_name),
                server_capabilities: None,
            },
            Ok(None) | Err(HssError::IdentityNotAssociated { .. }) => failure(
                CxResult::Experimental(OGS_DIAM_CX_ERROR_IDENTITY_NOT_REGISTERED),
            ),
            Err(e) => failure(unable_to_comply(user_name, &e)),
        };
    }

    if let Err(e) = ctx.cx_associate_identity(user_name, public_identity) {
        return failure(unable_to_comply(user_name, &e));
    }

    let server_name = match authorization_type {
        UserAuthorizationType::RegistrationAndCapabilities => None,
        _ => match ctx.cx_get_server_name(user_name, public_identity) {
            Ok(server_name) => server_name,
            Err(e) => return failure(unable_to_comply(user_name, &e)),
        },
    };

    match server_name {
        Some(server_name) => UaaMessage {
            result: CxResult::Experimental(OGS_DIAM_CX_SUBSEQUENT_REGISTRATION),
            server_name: Some(server_name),
            server_capabilities: None,
        },
        None => UaaMessage {
            result: CxResult::Experimental(OGS_DIAM_CX_FIRST_REGISTRATION),
            server_name: None,
            server_capabilities: Some(ServerCapabilities::default()),
        },
    }
}

/// Handle Server-Assignment-Request (SAR)
///
/// Sent by the S-CSCF to claim or release a public identity. Registration
/// types take the binding over; an unregistered-user assignment only binds
/// a free identity. Deregistration types leave the binding in place.
pub fn handle_sar(
    ctx: &HssContext,
    user_name: &str,
    public_identity: &str,
    server_name: &str,
    assignment_type: ServerAssignmentType,
) -> SaaMessage {
    log::debug!(
        "[{user_name}] Rx SAR for {public_identity} (type={assignment_type:?}, server={server_name})"
    );
    let stats = ctx.cx_stats();
    inc(&stats.rx_sar);

    let answer = sar_answer(ctx, user_name, public_identity, server_name, assignment_type);
    if !answer.result.is_success() {
        inc(&stats.rx_sar_error);
    }

    inc(&stats.tx_saa);
    answer
}

fn sar_answer(
    ctx: &HssContext,
    user_name: &str,
    public_identity: &str,
    server_name: &str,
    assignment_type: ServerAssignmentType,
) -> SaaMessage {
    let failure = |result| SaaMessage {
        result,
        server_name: None,
    };
    let dont_match = || {
        log::warn!("[{user_name}] SAR for unassociated identity {public_identity}");
        failure(CxResult::Experimental(OGS_DIAM_CX_ERROR_IDENTITIES_DONT_MATCH))
    };

    let overwrite = match assignment_type {
        t if t.is_registration() => Some(true),
        ServerAssignmentType::UnregisteredUser => Some(false),
        _ => None,
    };

    // Binding types answer with the outcome of the bind, taken under the
    // same Cx lock hold.
    let Some(overwrite) = overwrite else {
        return match ctx.cx_get_server_name(user_name, public_identity) {
            Ok(bound) => SaaMessage {
                result: CxResult::Base(OGS_DIAM_SUCCESS),
                server_name: bound,
            },
            Err(HssError::IdentityNotAssociated { .. }) => dont_match(),
            Err(e) => failure(unable_to_comply(user_name, &e)),
        };
    };

    match ctx.cx_set_server_name(user_name, public_identity, server_name, overwrite) {
        Ok(ServerNameUpdate::Rejected { current }) => SaaMessage {
            result: CxResult::Experimental(OGS_DIAM_CX_ERROR_IDENTITY_ALREADY_REGISTERED),
            server_name: Some(current),
        },
        Ok(_) => SaaMessage {
            result: CxResult::Base(OGS_DIAM_SUCCESS),
            server_name: Some(server_name.to_string()),
        },
        Err(HssError::IdentityNotAssociated { .. }) => dont_match(),
        Err(e) => failure(unable_to_comply(user_name, &e)),
    }
}

/// Handle Location-Info-Request (LIR)
///
/// Sent by the I-CSCF to route a request towards the S-CSCF serving
/// `public_identity`.
pub fn handle_lir(ctx: &HssContext, user_name: &str, public_identity: &str) -> LiaMessage {
    log::debug!("[{user_name}] Rx LIR for {public_identity}");
    let stats = ctx.cx_stats();
    inc(&stats.rx_lir);

    let answer = match ctx.cx_get_server_name(user_name, public_identity) {
        Ok(Some(server_name)) => LiaMessage {
            result: CxResult::Base(OGS_DIAM_SUCCESS),
            server_name: Some(server_name),
            server_capabilities: None,
        },
        Ok(None) => LiaMessage {
            result: CxResult::Experimental(OGS_DIAM_CX_UNREGISTERED_SERVICE),
            server_name: None,
            server_capabilities: Some(ServerCapabilities::default()),
        },
        Err(HssError::IdentityNotAssociated { .. }) => LiaMessage {
            result: CxResult::Experimental(OGS_DIAM_CX_ERROR_IDENTITY_NOT_REGISTERED),
            server_name: None,
            server_capabilities: None,
        },
        Err(e) => LiaMessage {
            result: unable_to_comply(user_name, &e),
            server_name: None,
            server_capabilities: None,
        },
    };
    if !answer.result.is_success() {
        inc(&stats.rx_lir_error);
    }

    inc(&stats.tx_lia);
    answer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HssConfig, PoolConfig};
    use ogs_dbi::MemoryDbi;
    use std::sync::Arc;
    use std::thread;

    const IMPI: &str = "user@ims.mnc001.mcc001.3gppnetwork.org";
    const IMPU: &str = "sip:user@ims.mnc001.mcc001.3gppnetwork.org";
    const SCSCF_A: &str = "sip:scscf-a.ims.mnc001.mcc001.3gppnetwork.org";
    const SCSCF_B: &str = "sip:scscf-b.ims.mnc001.mcc001.3gppnetwork.org";

    fn new_context() -> HssContext {
        HssContext::init(HssConfig::default(), Box::new(MemoryDbi::new()))
    }

    #[test]
    fn test_server_assignment_type_from_u32() {
        assert_eq!(ServerAssignmentType::from(1), ServerAssignmentType::Registration);
        assert_eq!(ServerAssignmentType::from(5), ServerAssignmentType::UserDeregistration);
        assert_eq!(ServerAssignmentType::from(99), ServerAssignmentType::NoAssignment);
        assert!(ServerAssignmentType::ReRegistration.is_registration());
        assert!(!ServerAssignmentType::UnregisteredUser.is_registration());
    }

    #[test]
    fn test_user_authorization_type_from_u32() {
        assert_eq!(UserAuthorizationType::from(0), UserAuthorizationType::Registration);
        assert_eq!(UserAuthorizationType::from(1), UserAuthorizationType::DeRegistration);
        assert_eq!(UserAuthorizationType::from(7), UserAuthorizationType::Registration);
    }

    #[test]
    fn test_uar_first_then_subsequent_registration() {
        let ctx = new_context();

        let uaa = handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);
        assert_eq!(uaa.result, CxResult::Experimental(OGS_DIAM_CX_FIRST_REGISTRATION));
        assert_eq!(uaa.server_capabilities, Some(ServerCapabilities::default()));
        assert!(ctx.cx_identity_is_associated(IMPI, IMPU));

        handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::Registration);

        let uaa = handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);
        assert_eq!(uaa.result, CxResult::Experimental(OGS_DIAM_CX_SUBSEQUENT_REGISTRATION));
        assert_eq!(uaa.server_name.as_deref(), Some(SCSCF_A));
        assert!(uaa.server_capabilities.is_none());
    }

    #[test]
    fn test_uar_capabilities_requested() {
        let ctx = new_context();
        handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);
        handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::Registration);

        let uaa = handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::RegistrationAndCapabilities);
        assert_eq!(uaa.result, CxResult::Experimental(OGS_DIAM_CX_FIRST_REGISTRATION));
        assert!(uaa.server_name.is_none());
        assert!(uaa.server_capabilities.is_some());
    }

    #[test]
    fn test_uar_deregistration() {
        let ctx = new_context();

        let uaa = handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::DeRegistration);
        assert_eq!(uaa.result, CxResult::Experimental(OGS_DIAM_CX_ERROR_IDENTITY_NOT_REGISTERED));
        assert!(!ctx.cx_identity_is_associated(IMPI, IMPU));

        handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);
        handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::Registration);
        let uaa = handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::DeRegistration);
        assert_eq!(uaa.result, CxResult::Base(OGS_DIAM_SUCCESS));
        assert_eq!(uaa.server_name.as_deref(), Some(SCSCF_A));
    }

    #[test]
    fn test_uar_pool_exhausted() {
        let config = HssConfig {
            pool: PoolConfig { impi: 1, impu: 1 },
            ..Default::default()
        };
        let ctx = HssContext::init(config, Box::new(MemoryDbi::new()));

        handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);
        let uaa = handle_uar(&ctx, IMPI, "tel:+15551234", UserAuthorizationType::Registration);
        assert_eq!(uaa.result, CxResult::Base(OGS_DIAM_UNABLE_TO_COMPLY));
        assert_eq!(get(&ctx.cx_stats().rx_uar_error), 1);
        assert_eq!(get(&ctx.cx_stats().tx_uaa), 2);
    }

    #[test]
    fn test_sar_identities_dont_match() {
        let ctx = new_context();
        let saa = handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::Registration);
        assert_eq!(saa.result, CxResult::Experimental(OGS_DIAM_CX_ERROR_IDENTITIES_DONT_MATCH));
        assert_eq!(ctx.impi_count(), 0);
        assert_eq!(get(&ctx.cx_stats().rx_sar_error), 1);
    }

    #[test]
    fn test_sar_registration_overwrites() {
        let ctx = new_context();
        handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);

        let saa = handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::Registration);
        assert_eq!(saa.result, CxResult::Base(OGS_DIAM_SUCCESS));
        assert_eq!(saa.server_name.as_deref(), Some(SCSCF_A));

        let saa = handle_sar(&ctx, IMPI, IMPU, SCSCF_B, ServerAssignmentType::ReRegistration);
        assert_eq!(saa.server_name.as_deref(), Some(SCSCF_B));
        assert_eq!(ctx.cx_get_server_name(IMPI, IMPU).unwrap().as_deref(), Some(SCSCF_B));
    }

    #[test]
    fn test_sar_answer_reports_own_binding_under_contention() {
        let ctx = Arc::new(new_context());
        handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);

        let workers: Vec<_> = [SCSCF_A, SCSCF_B]
            .into_iter()
            .map(|scscf| {
                let ctx = Arc::clone(&ctx);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let saa =
                            handle_sar(&ctx, IMPI, IMPU, scscf, ServerAssignmentType::Registration);
                        assert_eq!(saa.result, CxResult::Base(OGS_DIAM_SUCCESS));
                        assert_eq!(saa.server_name.as_deref(), Some(scscf));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(get(&ctx.cx_stats().tx_saa), 1000);
    }

    #[test]
    fn test_sar_no_assignment_reports_binding() {
        let ctx = new_context();
        handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);
        handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::Registration);

        let saa = handle_sar(&ctx, IMPI, IMPU, SCSCF_B, ServerAssignmentType::NoAssignment);
        assert_eq!(saa.result, CxResult::Base(OGS_DIAM_SUCCESS));
        assert_eq!(saa.server_name.as_deref(), Some(SCSCF_A));
    }

    #[test]
    fn test_sar_unregistered_user_keeps_binding() {
        let ctx = new_context();
        handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);
        handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::UnregisteredUser);

        let saa = handle_sar(&ctx, IMPI, IMPU, SCSCF_B, ServerAssignmentType::UnregisteredUser);
        assert_eq!(
            saa.result,
            CxResult::Experimental(OGS_DIAM_CX_ERROR_IDENTITY_ALREADY_REGISTERED)
        );
        assert_eq!(saa.server_name.as_deref(), Some(SCSCF_A));
        assert_eq!(ctx.cx_get_server_name(IMPI, IMPU).unwrap().as_deref(), Some(SCSCF_A));
    }

    #[test]
    fn test_sar_deregistration_keeps_binding() {
        let ctx = new_context();
        handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);
        handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::Registration);

        let saa = handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::UserDeregistration);
        assert_eq!(saa.result, CxResult::Base(OGS_DIAM_SUCCESS));
        assert_eq!(ctx.cx_get_server_name(IMPI, IMPU).unwrap().as_deref(), Some(SCSCF_A));
    }

    #[test]
    fn test_lir() {
        let ctx = new_context();

        let lia = handle_lir(&ctx, IMPI, IMPU);
        assert_eq!(lia.result, CxResult::Experimental(OGS_DIAM_CX_ERROR_IDENTITY_NOT_REGISTERED));

        handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);
        let lia = handle_lir(&ctx, IMPI, IMPU);
        assert_eq!(lia.result, CxResult::Experimental(OGS_DIAM_CX_UNREGISTERED_SERVICE));
        assert!(lia.server_capabilities.is_some());

        handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::Registration);
        let lia = handle_lir(&ctx, IMPI, IMPU);
        assert_eq!(lia.result, CxResult::Base(OGS_DIAM_SUCCESS));
        assert_eq!(lia.server_name.as_deref(), Some(SCSCF_A));

        let stats = ctx.cx_stats();
        assert_eq!(get(&stats.rx_lir), 3);
        assert_eq!(get(&stats.rx_lir_error), 1);
        assert_eq!(get(&stats.tx_lia), 3);
    }

    #[test]
    fn test_lir_sibling_fallback() {
        let ctx = new_context();
        handle_uar(&ctx, IMPI, IMPU, UserAuthorizationType::Registration);
        handle_uar(&ctx, IMPI, "tel:+15551234", UserAuthorizationType::Registration);
        handle_sar(&ctx, IMPI, IMPU, SCSCF_A, ServerAssignmentType::Registration);

        let lia = handle_lir(&ctx, IMPI, "tel:+15551234");
        assert_eq!(lia.server_name.as_deref(), Some(SCSCF_A));
    }

    #[test]
    fn test_cx_stats_display() {
        let ctx = new_context();
        handle_lir(&ctx, IMPI, IMPU);
        let line = ctx.cx_stats().to_string();
        assert!(line.starts_with("[CX]"));
        assert!(line.contains("LIR:1 (1 err)"));
    }
}
