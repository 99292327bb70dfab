use std::error::Error as StdError;
use std::fmt;

#[cfg(feature = "anonymous")]
use super::mechanisms::AnonymousError;
#[cfg(feature = "digest-md5")]
use super::mechanisms::DigestMd5Error;
#[cfg(feature = "scram")]
use super::mechanisms::ScramError;
use super::mechanisms::{OAuthError, PlainError};
use super::{Negotiation, Registry};

/// The condition sent to the client in a SASL `<failure/>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The client aborted the exchange.
    Aborted,
    /// The client violated the mechanism’s protocol.
    BadProtocol,
    /// The requested identity isn’t a valid username.
    BadUsername,
    /// The authorization identity is malformed.
    InvalidAuthzid,
    /// The mechanism isn’t supported.
    InvalidMechanism,
    /// The request couldn’t be processed.
    MalformedRequest,
    /// Wrong credentials.
    NotAuthorized,
    /// The server couldn’t complete the authentication, the client may retry.
    TemporaryAuthFailure,
}

impl ErrorCode {
    /// The name of this condition on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Aborted => "aborted",
            ErrorCode::BadProtocol => "bad-protocol",
            ErrorCode::BadUsername => "bad-username",
            ErrorCode::InvalidAuthzid => "invalid-authzid",
            ErrorCode::InvalidMechanism => "invalid-mechanism",
            ErrorCode::MalformedRequest => "malformed-request",
            ErrorCode::NotAuthorized => "not-authorized",
            ErrorCode::TemporaryAuthFailure => "temporary-auth-failure",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

/// Why a negotiation failed.
#[derive(Debug, PartialEq)]
pub enum ErrorReason {
    /// The client selected a mechanism which isn’t registered.
    UnsupportedMechanism,
    /// The authenticated identity was rejected by the identity normalizer.
    NodeprepFailed,
    /// The authenticated identity normalized to nothing.
    EmptyUsername,
    /// The client aborted the exchange.
    Aborted,
    /// The mechanism itself failed.
    Mechanism(MechanismError),
}

pub(crate) const UNSUPPORTED_MECHANISM: (ErrorCode, &str) =
    (ErrorCode::InvalidMechanism, "Unsupported mechanism");

impl ErrorReason {
    /// The fixed rendering of the engine’s own reasons, `None` for mechanism errors.
    pub(crate) fn core_condition(&self) -> Option<(ErrorCode, &'static str)> {
        match self {
            ErrorReason::UnsupportedMechanism => Some(UNSUPPORTED_MECHANISM),
            ErrorReason::NodeprepFailed => Some((ErrorCode::BadUsername, "Nodeprep failed")),
            ErrorReason::EmptyUsername => Some((ErrorCode::BadUsername, "Empty username")),
            ErrorReason::Aborted => Some((ErrorCode::Aborted, "Aborted")),
            ErrorReason::Mechanism(_) => None,
        }
    }
}

impl From<MechanismError> for ErrorReason {
    fn from(err: MechanismError) -> ErrorReason {
        ErrorReason::Mechanism(err)
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorReason::UnsupportedMechanism => write!(fmt, "unsupported mechanism"),
            ErrorReason::NodeprepFailed => write!(fmt, "nodeprep failed"),
            ErrorReason::EmptyUsername => write!(fmt, "empty username"),
            ErrorReason::Aborted => write!(fmt, "aborted"),
            ErrorReason::Mechanism(err) => write!(fmt, "mechanism error: {}", err),
        }
    }
}

impl StdError for ErrorReason {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ErrorReason::Mechanism(err) => Some(err),
            _ => None,
        }
    }
}

/// An error produced by one mechanism family.
#[derive(Debug, PartialEq)]
pub enum MechanismError {
    /// From ANONYMOUS.
    #[cfg(feature = "anonymous")]
    Anonymous(AnonymousError),
    /// From DIGEST-MD5.
    #[cfg(feature = "digest-md5")]
    DigestMd5(DigestMd5Error),
    /// From PLAIN.
    Plain(PlainError),
    /// From the SCRAM family.
    #[cfg(feature = "scram")]
    Scram(ScramError),
    /// From X-OAUTH2.
    OAuth(OAuthError),
}

impl MechanismError {
    /// The default rendering, used unless a mechanism overrides
    /// [`Mechanism::format_error`](super::Mechanism::format_error).
    pub fn condition(&self) -> (ErrorCode, &'static str) {
        match self {
            #[cfg(feature = "anonymous")]
            MechanismError::Anonymous(err) => err.condition(),
            #[cfg(feature = "digest-md5")]
            MechanismError::DigestMd5(err) => err.condition(),
            MechanismError::Plain(err) => err.condition(),
            #[cfg(feature = "scram")]
            MechanismError::Scram(err) => err.condition(),
            MechanismError::OAuth(err) => err.condition(),
        }
    }
}

impl fmt::Display for MechanismError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            #[cfg(feature = "anonymous")]
            MechanismError::Anonymous(err) => write!(fmt, "ANONYMOUS: {}", err),
            #[cfg(feature = "digest-md5")]
            MechanismError::DigestMd5(err) => write!(fmt, "DIGEST-MD5: {}", err),
            MechanismError::Plain(err) => write!(fmt, "PLAIN: {}", err),
            #[cfg(feature = "scram")]
            MechanismError::Scram(err) => write!(fmt, "SCRAM: {}", err),
            MechanismError::OAuth(err) => write!(fmt, "X-OAUTH2: {}", err),
        }
    }
}

impl StdError for MechanismError {}

#[cfg(feature = "anonymous")]
impl From<AnonymousError> for MechanismError {
    fn from(err: AnonymousError) -> MechanismError {
        MechanismError::Anonymous(err)
    }
}

#[cfg(feature = "digest-md5")]
impl From<DigestMd5Error> for MechanismError {
    fn from(err: DigestMd5Error) -> MechanismError {
        MechanismError::DigestMd5(err)
    }
}

impl From<PlainError> for MechanismError {
    fn from(err: PlainError) -> MechanismError {
        MechanismError::Plain(err)
    }
}

#[cfg(feature = "scram")]
impl From<ScramError> for MechanismError {
    fn from(err: ScramError) -> MechanismError {
        MechanismError::Scram(err)
    }
}

impl From<OAuthError> for MechanismError {
    fn from(err: OAuthError) -> MechanismError {
        MechanismError::OAuth(err)
    }
}

/// What an error is formatted against.
#[derive(Debug, Clone, Copy)]
pub enum ErrorContext<'a> {
    /// A mechanism name, for instance right after a failed selection.
    Mechanism(&'a str),
    /// A negotiation which has a mechanism bound.
    Negotiation(&'a Negotiation),
}

impl<'a> From<&'a str> for ErrorContext<'a> {
    fn from(name: &'a str) -> ErrorContext<'a> {
        ErrorContext::Mechanism(name)
    }
}

impl<'a> From<&'a Negotiation> for ErrorContext<'a> {
    fn from(negotiation: &'a Negotiation) -> ErrorContext<'a> {
        ErrorContext::Negotiation(negotiation)
    }
}

/// Renders any [`ErrorReason`] into a condition and a human-readable text.
///
/// The engine’s own reasons have fixed renderings, anything else is rendered by the
/// mechanism the context resolves to in the default registry. This never fails: an
/// unresolvable context renders as an unsupported mechanism.
pub fn format_error<'a, C: Into<ErrorContext<'a>>>(
    context: C,
    reason: &ErrorReason,
) -> (ErrorCode, &'static str) {
    Registry::default().format_error(context, reason)
}
