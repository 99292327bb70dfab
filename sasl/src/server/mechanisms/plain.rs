//! Provides the SASL "PLAIN" mechanism.

use log::debug;
use std::fmt;
use std::sync::Arc;

use super::local_part;
use crate::common::Properties;
use crate::server::{ErrorCode, Mechanism, MechanismState, PasswordValidator, Session, Step};

/// Errors of the PLAIN mechanism.
#[derive(Debug, PartialEq)]
pub enum PlainError {
    /// The message isn’t `authzid NUL authcid NUL passwd`.
    ParserFailed,
    /// Wrong username or password.
    NotAuthorized,
}

impl PlainError {
    pub(crate) fn condition(&self) -> (ErrorCode, &'static str) {
        match self {
            PlainError::ParserFailed => (ErrorCode::BadProtocol, "Response decoding failed"),
            PlainError::NotAuthorized => {
                (ErrorCode::NotAuthorized, "Invalid username or password")
            }
        }
    }
}

impl fmt::Display for PlainError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlainError::ParserFailed => write!(fmt, "failed to decode message"),
            PlainError::NotAuthorized => write!(fmt, "invalid username or password"),
        }
    }
}

impl std::error::Error for PlainError {}

/// A message of the form `authzid NUL authcid NUL secret`, shared with X-OAUTH2.
pub(crate) struct PlainMessage<'a> {
    authzid: &'a str,
    pub(crate) username: &'a str,
    pub(crate) secret: &'a str,
}

impl<'a> PlainMessage<'a> {
    pub(crate) fn parse(payload: &'a [u8]) -> Option<PlainMessage<'a>> {
        let payload = std::str::from_utf8(payload).ok()?;
        let mut fields = payload.split('\0');
        let authzid = fields.next()?;
        let username = fields.next()?;
        let secret = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        Some(PlainMessage {
            authzid,
            username,
            secret,
        })
    }

    /// The username and authzid, without their domain. An empty authzid means the
    /// username.
    pub(crate) fn identities(&self, server_domain: &str) -> Option<(&'a str, &'a str)> {
        let username = local_part(self.username, server_domain)?;
        let authzid = if self.authzid.is_empty() {
            username
        } else {
            local_part(self.authzid, server_domain)?
        };
        Some((username, authzid))
    }
}

/// The SASL PLAIN mechanism.
pub struct Plain;

impl Mechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn initialize(&self, session: &Session) -> Box<dyn MechanismState> {
        Box::new(PlainState {
            server_domain: session.server_domain().to_owned(),
            check_password: session.callbacks().check_password().clone(),
        })
    }
}

struct PlainState {
    server_domain: String,
    check_password: Arc<dyn PasswordValidator>,
}

impl MechanismState for PlainState {
    fn advance(self: Box<Self>, payload: &[u8]) -> Step {
        let message = match PlainMessage::parse(payload) {
            Some(message) => message,
            None => return Step::failed(PlainError::ParserFailed),
        };
        let (username, authzid) = match message.identities(&self.server_domain) {
            Some(identities) => identities,
            None => return Step::failed_for(PlainError::NotAuthorized, message.username),
        };
        match self.check_password.validate(username, authzid, message.secret) {
            Ok(auth_module) => Step::Success(Properties::authenticated(
                username,
                authzid,
                "PLAIN",
                &auth_module,
            )),
            Err(err) => {
                debug!("PLAIN validation failed for {:?}: {}", username, err);
                Step::failed_for(PlainError::NotAuthorized, username)
            }
        }
    }
}
