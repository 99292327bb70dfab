//! Provides the "X-OAUTH2" mechanism: PLAIN, with a bearer token instead of a password.

use log::debug;
use std::fmt;
use std::sync::Arc;

use super::plain::PlainMessage;
use crate::common::Properties;
use crate::server::{ErrorCode, Mechanism, MechanismState, Session, Step, TokenValidator};

/// The scope a token must grant to be usable for authentication.
const SCOPE: &str = "sasl_auth";

/// Errors of the X-OAUTH2 mechanism.
#[derive(Debug, PartialEq)]
pub enum OAuthError {
    /// The message isn’t `authzid NUL authcid NUL token`.
    ParserFailed,
    /// The token wasn’t accepted.
    NotAuthorized,
}

impl OAuthError {
    pub(crate) fn condition(&self) -> (ErrorCode, &'static str) {
        match self {
            OAuthError::ParserFailed => (ErrorCode::BadProtocol, "Response decoding failed"),
            OAuthError::NotAuthorized => (ErrorCode::NotAuthorized, "Invalid token"),
        }
    }
}

impl fmt::Display for OAuthError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OAuthError::ParserFailed => write!(fmt, "failed to decode message"),
            OAuthError::NotAuthorized => write!(fmt, "invalid token"),
        }
    }
}

impl std::error::Error for OAuthError {}

/// The X-OAUTH2 mechanism.
pub struct OAuth;

impl Mechanism for OAuth {
    fn name(&self) -> &'static str {
        "X-OAUTH2"
    }

    fn initialize(&self, session: &Session) -> Box<dyn MechanismState> {
        Box::new(OAuthState {
            server_domain: session.server_domain().to_owned(),
            check_token: session.callbacks().check_token().cloned(),
        })
    }
}

struct OAuthState {
    server_domain: String,
    check_token: Option<Arc<dyn TokenValidator>>,
}

impl MechanismState for OAuthState {
    fn advance(self: Box<Self>, payload: &[u8]) -> Step {
        let OAuthState {
            server_domain,
            check_token,
        } = *self;
        let message = match PlainMessage::parse(payload) {
            Some(message) => message,
            None => return Step::failed(OAuthError::ParserFailed),
        };
        let (username, authzid) = match message.identities(&server_domain) {
            Some(identities) => identities,
            None => return Step::failed_for(OAuthError::NotAuthorized, message.username),
        };
        let check_token = match check_token {
            Some(check_token) => check_token,
            None => {
                debug!("X-OAUTH2 selected but no token validator is configured");
                return Step::failed_for(OAuthError::NotAuthorized, username);
            }
        };
        match check_token.validate_token(username, &server_domain, &[SCOPE], message.secret) {
            Ok(auth_module) => Step::Success(Properties::authenticated(
                username,
                authzid,
                "X-OAUTH2",
                &auth_module,
            )),
            Err(err) => {
                debug!("X-OAUTH2 token rejected for {:?}: {}", username, err);
                Step::failed_for(OAuthError::NotAuthorized, username)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing;
    use crate::server::{Callbacks, ErrorReason, MechanismError, Outcome};

    fn failure(outcome: Outcome) -> OAuthError {
        match outcome {
            Outcome::Failure(ErrorReason::Mechanism(MechanismError::OAuth(err)), _) => err,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn valid_token() {
        let outcome = testing::session().start("X-OAUTH2", b"\0alice\0token-alice");
        let props = outcome.properties().unwrap();
        assert_eq!(props.authzid(), Some("alice"));
        assert_eq!(props.mechanism(), Some("X-OAUTH2"));
        assert_eq!(props.auth_module(), Some("oauth"));
    }

    #[test]
    fn invalid_token() {
        let session = testing::session();
        assert_eq!(
            failure(session.start("X-OAUTH2", b"\0alice\0secret")),
            OAuthError::NotAuthorized
        );
        assert_eq!(
            failure(session.start("X-OAUTH2", b"token-alice")),
            OAuthError::ParserFailed
        );
    }

    #[test]
    fn without_validator() {
        let store = Arc::new(testing::store());
        let callbacks = Callbacks::new(store.clone(), store.clone(), store);
        let session = Session::new("xmpp", "example.com", "", callbacks);
        assert_eq!(
            failure(session.start("X-OAUTH2", b"\0alice\0token-alice")),
            OAuthError::NotAuthorized
        );
    }
}
