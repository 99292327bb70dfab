//! Server side of SASL: the negotiation engine, its registry of mechanisms and the
//! contracts credential backends implement.

use crate::common::Properties;
use crate::secret::Password;
use std::fmt;
use std::sync::Arc;

mod error;
pub mod mechanisms;
mod normalize;
mod registry;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use self::error::{format_error, ErrorCode, ErrorContext, ErrorReason, MechanismError};
pub use self::normalize::{IdentityNormalizer, Nodeprep};
pub use self::registry::{list_mechanisms, Registry};
pub use self::session::{Negotiation, Outcome, Session};

/// Retrieves stored passwords, for mechanisms which need to compute proofs themselves.
pub trait PasswordProvider: Send + Sync {
    /// Returns the stored password of `username` along with the name of the backend
    /// which holds it.
    fn provide(&self, username: &str) -> Result<(Password, String), ProviderError>;
}

/// Checks a plaintext password.
pub trait PasswordValidator: Send + Sync {
    /// Returns the name of the backend which accepted the password.
    fn validate(
        &self,
        username: &str,
        authzid: &str,
        password: &str,
    ) -> Result<String, ValidatorError>;
}

/// Checks a digest computed from the stored password.
pub trait DigestValidator: Send + Sync {
    /// The backend applies `digest_gen` to the stored password of `username` and
    /// compares the result with `digest`. Returns the name of the backend on a match.
    fn validate_digest(
        &self,
        username: &str,
        authzid: &str,
        digest: &str,
        digest_gen: &dyn Fn(&str) -> String,
    ) -> Result<String, ValidatorError>;
}

/// Checks a bearer token.
pub trait TokenValidator: Send + Sync {
    /// Returns the name of the backend which accepted `token` for `username`@`server`
    /// with the requested `scope`.
    fn validate_token(
        &self,
        username: &str,
        server: &str,
        scope: &[&str],
        token: &str,
    ) -> Result<String, ValidatorError>;
}

/// Errors a [`PasswordProvider`] can return.
#[derive(Debug, PartialEq)]
pub enum ProviderError {
    /// No such user.
    UnknownUser,
    /// The backend couldn’t be queried.
    Unavailable,
}

/// Errors a validator can return.
#[derive(Debug, PartialEq)]
pub enum ValidatorError {
    /// The secret didn’t match.
    AuthenticationFailed,
    /// The stored password couldn’t be retrieved.
    ProviderError(ProviderError),
}

impl From<ProviderError> for ValidatorError {
    fn from(err: ProviderError) -> ValidatorError {
        ValidatorError::ProviderError(err)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProviderError::UnknownUser => write!(fmt, "unknown user"),
            ProviderError::Unavailable => write!(fmt, "credential backend unavailable"),
        }
    }
}

impl fmt::Display for ValidatorError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValidatorError::AuthenticationFailed => write!(fmt, "authentication failed"),
            ValidatorError::ProviderError(err) => write!(fmt, "provider error: {}", err),
        }
    }
}

impl std::error::Error for ProviderError {}

impl std::error::Error for ValidatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ValidatorError::ProviderError(err) => Some(err),
            ValidatorError::AuthenticationFailed => None,
        }
    }
}

/// The credential callbacks of a [`Session`].
///
/// The engine never calls them, it only hands them to the selected mechanism.
#[derive(Clone)]
pub struct Callbacks {
    get_password: Arc<dyn PasswordProvider>,
    check_password: Arc<dyn PasswordValidator>,
    check_password_digest: Arc<dyn DigestValidator>,
    check_token: Option<Arc<dyn TokenValidator>>,
}

impl Callbacks {
    /// Bundles the three mandatory callbacks.
    pub fn new(
        get_password: Arc<dyn PasswordProvider>,
        check_password: Arc<dyn PasswordValidator>,
        check_password_digest: Arc<dyn DigestValidator>,
    ) -> Callbacks {
        Callbacks {
            get_password,
            check_password,
            check_password_digest,
            check_token: None,
        }
    }

    /// Adds a bearer token validator, without which X-OAUTH2 rejects everyone.
    pub fn with_token_validator(mut self, check_token: Arc<dyn TokenValidator>) -> Callbacks {
        self.check_token = Some(check_token);
        self
    }

    /// Password retrieval.
    pub fn get_password(&self) -> &Arc<dyn PasswordProvider> {
        &self.get_password
    }

    /// Plaintext password check.
    pub fn check_password(&self) -> &Arc<dyn PasswordValidator> {
        &self.check_password
    }

    /// Digest check.
    pub fn check_password_digest(&self) -> &Arc<dyn DigestValidator> {
        &self.check_password_digest
    }

    /// Bearer token check, if configured.
    pub fn check_token(&self) -> Option<&Arc<dyn TokenValidator>> {
        self.check_token.as_ref()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Callbacks")
            .field("check_token", &self.check_token.is_some())
            .finish_non_exhaustive()
    }
}

/// A SASL mechanism as registered in a [`Registry`].
///
/// This is stateless, every negotiation gets its own [`MechanismState`] from
/// [`initialize`](Mechanism::initialize).
pub trait Mechanism: Sync {
    /// The name of the mechanism, as advertised to clients.
    fn name(&self) -> &'static str;

    /// Creates fresh state for one negotiation.
    fn initialize(&self, session: &Session) -> Box<dyn MechanismState>;

    /// Renders an error this mechanism produced.
    fn format_error(&self, error: &MechanismError) -> (ErrorCode, &'static str) {
        error.condition()
    }
}

/// The per-negotiation state of a mechanism, opaque to the engine.
pub trait MechanismState: Send {
    /// Consumes the state and advances the exchange by one client message.
    fn advance(self: Box<Self>, payload: &[u8]) -> Step;
}

/// What a mechanism reports after one round.
pub enum Step {
    /// Authenticated, nothing left to send.
    Success(Properties),
    /// Authenticated, but `Vec<u8>` still has to reach the client.
    SuccessWithData(Properties, Vec<u8>),
    /// Send the challenge and wait for another response, using the new state.
    Continue(Vec<u8>, Box<dyn MechanismState>),
    /// Authentication failed, possibly for a known username.
    Failure(MechanismError, Option<String>),
}

impl Step {
    /// A failure with the username the client attempted.
    pub fn failed_for<E: Into<MechanismError>>(error: E, username: &str) -> Step {
        Step::Failure(error.into(), Some(username.to_owned()))
    }

    /// A failure before any username could be decoded.
    pub fn failed<E: Into<MechanismError>>(error: E) -> Step {
        Step::Failure(error.into(), None)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Step::Success(props) => fmt.debug_tuple("Success").field(props).finish(),
            Step::SuccessWithData(props, data) => fmt
                .debug_tuple("SuccessWithData")
                .field(props)
                .field(data)
                .finish(),
            Step::Continue(challenge, _) => fmt.debug_tuple("Continue").field(challenge).finish(),
            Step::Failure(err, username) => fmt
                .debug_tuple("Failure")
                .field(err)
                .field(username)
                .finish(),
        }
    }
}
