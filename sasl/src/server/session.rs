use log::{debug, trace, warn};
use std::fmt;
use std::sync::Arc;

use super::{
    Callbacks, ErrorReason, IdentityNormalizer, Mechanism, MechanismState, Nodeprep, Registry,
    Step,
};
use crate::common::Properties;

/// One authentication attempt before a mechanism has been selected.
///
/// A `Session` never changes once built; selecting a mechanism with
/// [`start`](Session::start) yields a [`Negotiation`] and leaves the session usable for
/// another attempt.
#[derive(Clone)]
pub struct Session {
    service: String,
    server_domain: String,
    realm: String,
    callbacks: Callbacks,
    normalizer: Arc<dyn IdentityNormalizer>,
    registry: Registry,
}

impl Session {
    /// Creates a session for `service` (for instance `xmpp`) on `server_domain`.
    pub fn new<S: Into<String>, D: Into<String>, R: Into<String>>(
        service: S,
        server_domain: D,
        realm: R,
        callbacks: Callbacks,
    ) -> Session {
        Session {
            service: service.into(),
            server_domain: server_domain.into(),
            realm: realm.into(),
            callbacks,
            normalizer: Arc::new(Nodeprep),
            registry: Registry::default(),
        }
    }

    /// Replaces the default [`Nodeprep`] identity normalizer.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn IdentityNormalizer>) -> Session {
        self.normalizer = normalizer;
        self
    }

    /// Replaces the default registry.
    pub fn with_registry(mut self, registry: Registry) -> Session {
        self.registry = registry;
        self
    }

    /// The name of the service being authenticated to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The domain of this server.
    pub fn server_domain(&self) -> &str {
        &self.server_domain
    }

    /// The realm, empty if none was configured.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// The credential callbacks, for mechanisms.
    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// The registry mechanisms are selected from.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The mechanism names to advertise to the client.
    pub fn list_mechanisms(&self) -> Vec<&'static str> {
        self.registry.list_mechanisms()
    }

    /// Selects `mechanism` and processes the client’s initial response, which may be
    /// empty.
    pub fn start(&self, mechanism: &str, initial: &[u8]) -> Outcome {
        let plugin = match self.registry.resolve(mechanism) {
            Some(plugin) => plugin,
            None => {
                debug!("Client selected unsupported mechanism {:?}", mechanism);
                return Outcome::Failure(ErrorReason::UnsupportedMechanism, None);
            }
        };
        debug!(
            "Starting {} negotiation for {}@{}",
            plugin.name(),
            self.service,
            self.server_domain
        );
        let state = plugin.initialize(self);
        let negotiation = Negotiation {
            session: self.clone(),
            mechanism: plugin,
            state,
        };
        negotiation.step(initial)
    }

    /// Only lets a success through if its `authzid` is a valid, non-empty identity.
    fn check_credentials(&self, props: &Properties) -> Result<(), ErrorReason> {
        let authzid = props.authzid().unwrap_or_default();
        match self.normalizer.normalize(authzid) {
            None => Err(ErrorReason::NodeprepFailed),
            Some(identity) if identity.is_empty() => Err(ErrorReason::EmptyUsername),
            Some(_) => Ok(()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Session")
            .field("service", &self.service)
            .field("server_domain", &self.server_domain)
            .field("realm", &self.realm)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// A session with a mechanism selected, waiting for the client’s next response.
pub struct Negotiation {
    session: Session,
    mechanism: &'static dyn Mechanism,
    state: Box<dyn MechanismState>,
}

impl Negotiation {
    /// The name of the selected mechanism.
    pub fn mechanism(&self) -> &'static str {
        self.mechanism.name()
    }

    /// The session this negotiation belongs to.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn plugin(&self) -> &'static dyn Mechanism {
        self.mechanism
    }

    /// Processes one client response.
    ///
    /// This consumes the negotiation; only the one returned in
    /// [`Outcome::Continue`] may be stepped further.
    pub fn step(self, payload: &[u8]) -> Outcome {
        let Negotiation {
            session,
            mechanism,
            state,
        } = self;
        trace!("{} step with {} bytes", mechanism.name(), payload.len());
        match state.advance(payload) {
            Step::Success(props) => match session.check_credentials(&props) {
                Ok(()) => {
                    debug!("{} authenticated {:?}", mechanism.name(), props.authzid());
                    Outcome::Success(props)
                }
                Err(reason) => rejected(mechanism, reason, props),
            },
            Step::SuccessWithData(props, data) => match session.check_credentials(&props) {
                Ok(()) => {
                    debug!("{} authenticated {:?}", mechanism.name(), props.authzid());
                    Outcome::SuccessWithData(props, data)
                }
                Err(reason) => rejected(mechanism, reason, props),
            },
            Step::Continue(challenge, state) => Outcome::Continue(
                challenge,
                Negotiation {
                    session,
                    mechanism,
                    state,
                },
            ),
            Step::Failure(err, username) => {
                debug!(
                    "{} failed for {:?}: {}",
                    mechanism.name(),
                    username.as_deref().unwrap_or_default(),
                    err
                );
                Outcome::Failure(ErrorReason::Mechanism(err), username)
            }
        }
    }

    /// Ends the negotiation because the client gave up.
    pub fn abort(self) -> Outcome {
        debug!("{} negotiation aborted", self.mechanism.name());
        Outcome::Failure(ErrorReason::Aborted, None)
    }
}

fn rejected(mechanism: &dyn Mechanism, reason: ErrorReason, props: Properties) -> Outcome {
    warn!(
        "{} reported success for {:?} but the identity was rejected: {}",
        mechanism.name(),
        props.authzid().unwrap_or_default(),
        reason
    );
    Outcome::Failure(reason, props.username().map(str::to_owned))
}

impl fmt::Debug for Negotiation {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Negotiation")
            .field("mechanism", &self.mechanism.name())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// The result of [`Session::start`] or [`Negotiation::step`].
#[derive(Debug)]
pub enum Outcome {
    /// Authenticated.
    Success(Properties),
    /// Authenticated, send the data along with the success.
    SuccessWithData(Properties, Vec<u8>),
    /// Send the challenge, then step the negotiation with the client’s response.
    Continue(Vec<u8>, Negotiation),
    /// Authentication failed; the username is the one the client attempted, if known.
    Failure(ErrorReason, Option<String>),
}

impl Outcome {
    /// The properties of a successful outcome.
    pub fn properties(&self) -> Option<&Properties> {
        match self {
            Outcome::Success(props) | Outcome::SuccessWithData(props, _) => Some(props),
            Outcome::Continue(..) | Outcome::Failure(..) => None,
        }
    }

    /// Whether the client is now authenticated.
    pub fn is_success(&self) -> bool {
        self.properties().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Property;
    use crate::server::mechanisms::PlainError;
    use crate::server::testing::{self, Rejecting, COUNTED_MECHANISMS, TEST_MECHANISMS};
    use crate::server::{format_error, ErrorCode, MechanismError};

    fn session() -> Session {
        testing::init_logger();
        Session::new("xmpp", "example.com", "", testing::callbacks())
    }

    fn test_session() -> Session {
        session().with_registry(Registry::new(TEST_MECHANISMS))
    }

    #[test]
    fn plain_success() {
        let outcome = session().start("PLAIN", b"\0alice\0secret");
        let props = match outcome {
            Outcome::Success(props) => props,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(props.authzid(), Some("alice"));
        assert_eq!(props.username(), Some("alice"));
        assert_eq!(props.mechanism(), Some("PLAIN"));
        assert_eq!(props.auth_module(), Some(testing::AUTH_MODULE));
    }

    #[test]
    fn empty_identity() {
        // The soft hyphen is mapped to nothing by nodeprep.
        match session().start("PLAIN", "\0\u{00AD}\0hyphen".as_bytes()) {
            Outcome::Failure(ErrorReason::EmptyUsername, Some(username)) => {
                assert_eq!(username, "\u{00AD}")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn literally_empty_identity() {
        match test_session().start("X-ONE-ROUND", b"") {
            Outcome::Failure(ErrorReason::EmptyUsername, _) => (),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn unsupported_mechanism() {
        let session = session().with_registry(Registry::new(COUNTED_MECHANISMS));
        match session.start("BOGUS-MECH", b"anything") {
            Outcome::Failure(ErrorReason::UnsupportedMechanism, None) => (),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(testing::counted_initializations(), 0);
        // The session is untouched and can still select a mechanism.
        assert!(session.start("X-COUNTED", b"alice").is_success());
        assert_eq!(testing::counted_initializations(), 1);
    }

    #[test]
    fn mechanism_failure_is_verbatim() {
        match session().start("PLAIN", b"\0alice\0wrong") {
            Outcome::Failure(
                ErrorReason::Mechanism(MechanismError::Plain(PlainError::NotAuthorized)),
                Some(username),
            ) => assert_eq!(username, "alice"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    fn second_round(session: &Session, initial: &[u8], last: &[u8]) -> Outcome {
        match session.start("X-TWO-ROUND", initial) {
            Outcome::Continue(challenge, negotiation) => {
                assert_eq!(challenge, b"ready");
                assert_eq!(negotiation.mechanism(), "X-TWO-ROUND");
                negotiation.step(last)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn two_rounds_without_data() {
        match second_round(&test_session(), b"alice", b"") {
            Outcome::Success(props) => assert_eq!(props.authzid(), Some("alice")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn two_rounds_with_data() {
        match second_round(&test_session(), b"alice", b"with-data") {
            Outcome::SuccessWithData(props, data) => {
                assert_eq!(props.authzid(), Some("alice"));
                assert_eq!(data, b"final");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn rejected_identity_drops_data() {
        let session = test_session().with_normalizer(Arc::new(Rejecting("alice")));
        match second_round(&session, b"alice", b"with-data") {
            Outcome::Failure(ErrorReason::NodeprepFailed, Some(username)) => {
                assert_eq!(username, "alice")
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        match second_round(&session, b"alice", b"") {
            Outcome::Failure(ErrorReason::NodeprepFailed, _) => (),
            other => panic!("unexpected outcome {:?}", other),
        }
        // Anyone else still gets through.
        assert!(second_round(&session, b"bob", b"with-data").is_success());
    }

    #[test]
    fn empty_identity_drops_data() {
        let identity = "\u{00AD}";
        match second_round(&test_session(), identity.as_bytes(), b"with-data") {
            Outcome::Failure(ErrorReason::EmptyUsername, Some(username)) => {
                assert_eq!(username, identity)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn nodeprep_rejects_at_sign() {
        match second_round(&test_session(), b"alice@example.org", b"") {
            Outcome::Failure(ErrorReason::NodeprepFailed, _) => (),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn authzid_is_not_rewritten() {
        match second_round(&test_session(), b"Alice", b"") {
            Outcome::Success(props) => assert_eq!(props.authzid(), Some("Alice")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn missing_authzid_is_empty() {
        let props = Properties::new().with(Property::Username(String::from("alice")));
        assert_eq!(
            session().check_credentials(&props),
            Err(ErrorReason::EmptyUsername)
        );
    }

    #[test]
    fn abort() {
        let negotiation = match test_session().start("X-TWO-ROUND", b"alice") {
            Outcome::Continue(_, negotiation) => negotiation,
            other => panic!("unexpected outcome {:?}", other),
        };
        let reason = match negotiation.abort() {
            Outcome::Failure(reason, None) => reason,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(reason, ErrorReason::Aborted);
        assert_eq!(format_error("X-TWO-ROUND", &reason).0, ErrorCode::Aborted);
    }

    #[test]
    fn formats_against_negotiation() {
        let negotiation = match test_session().start("X-TWO-ROUND", b"alice") {
            Outcome::Continue(_, negotiation) => negotiation,
            other => panic!("unexpected outcome {:?}", other),
        };
        // Not resolvable by name in the default registry, but bound to the negotiation.
        let reason = ErrorReason::from(MechanismError::from(PlainError::ParserFailed));
        assert_eq!(
            format_error(&negotiation, &reason),
            (ErrorCode::BadProtocol, "Response decoding failed")
        );
        assert_eq!(
            format_error("X-TWO-ROUND", &reason),
            (ErrorCode::InvalidMechanism, "Unsupported mechanism")
        );
    }

    #[test]
    fn session_is_reusable() {
        let session = session();
        assert!(!session.start("PLAIN", b"\0alice\0wrong").is_success());
        assert!(session.start("PLAIN", b"\0alice\0secret").is_success());
    }

    #[test]
    fn list_from_session() {
        let session = session().with_registry(Registry::default().without("PLAIN"));
        assert!(!session.list_mechanisms().contains(&"PLAIN"));
        match session.start("PLAIN", b"\0alice\0secret") {
            Outcome::Failure(ErrorReason::UnsupportedMechanism, None) => (),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
