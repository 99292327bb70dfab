//! Provides the SASL "ANONYMOUS" mechanism.

use getrandom::getrandom;
use log::trace;
use std::fmt;

use crate::common::{hex, Properties};
use crate::server::{ErrorCode, Mechanism, MechanismState, Session, Step};

/// Errors of the ANONYMOUS mechanism.
#[derive(Debug, PartialEq)]
pub enum AnonymousError {
    /// No random username could be generated.
    RandomFailure(getrandom::Error),
}

impl AnonymousError {
    pub(crate) fn condition(&self) -> (ErrorCode, &'static str) {
        match self {
            AnonymousError::RandomFailure(_) => (
                ErrorCode::TemporaryAuthFailure,
                "Failed to generate a username",
            ),
        }
    }
}

impl fmt::Display for AnonymousError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnonymousError::RandomFailure(err) => {
                write!(fmt, "failure to get random data: {}", err)
            }
        }
    }
}

impl std::error::Error for AnonymousError {}

/// The SASL ANONYMOUS mechanism, which gives every client a fresh random username.
pub struct Anonymous;

impl Mechanism for Anonymous {
    fn name(&self) -> &'static str {
        "ANONYMOUS"
    }

    fn initialize(&self, _session: &Session) -> Box<dyn MechanismState> {
        Box::new(Anonymous)
    }
}

impl MechanismState for Anonymous {
    fn advance(self: Box<Self>, payload: &[u8]) -> Step {
        if !payload.is_empty() {
            trace!("ANONYMOUS trace: {:?}", String::from_utf8_lossy(payload));
        }
        let mut rand = [0u8; 16];
        if let Err(err) = getrandom(&mut rand) {
            return Step::failed(AnonymousError::RandomFailure(err));
        }
        let username = hex(&rand);
        Step::Success(Properties::authenticated(
            &username,
            &username,
            "ANONYMOUS",
            "anonymous",
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::server::testing;
    use crate::server::Outcome;

    #[test]
    fn random_usernames() {
        let session = testing::session();
        let first = session.start("ANONYMOUS", b"");
        let second = session.start("ANONYMOUS", b"sirhc@example.com");
        let first = first.properties().unwrap();
        let second = second.properties().unwrap();
        assert_eq!(first.username().map(str::len), Some(32));
        assert_eq!(first.username(), first.authzid());
        assert_ne!(first.username(), second.username());
        assert_eq!(first.mechanism(), Some("ANONYMOUS"));
        assert_eq!(second.auth_module(), Some("anonymous"));
    }

    #[test]
    fn single_round() {
        assert!(matches!(
            testing::session().start("ANONYMOUS", b""),
            Outcome::Success(_)
        ));
    }
}
