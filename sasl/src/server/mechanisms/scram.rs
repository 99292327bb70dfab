//! Provides the SASL "SCRAM-*" mechanisms, without channel binding.

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use hmac::digest::InvalidLength;
use log::debug;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::local_part;
use crate::common::scram::{
    generate_nonce, generate_salt, DeriveError, ScramProvider, DEFAULT_ITERATIONS,
};
use crate::common::{parse_frame, xor, Properties};
use crate::secret::Password;
use crate::server::{ErrorCode, Mechanism, MechanismState, PasswordProvider, Session, Step};

/// Errors of the SCRAM mechanisms.
#[derive(Debug, PartialEq)]
pub enum ScramError {
    /// A message wasn’t a valid SCRAM message.
    ParserFailed,
    /// An attribute was missing, out of order or empty.
    BadAttribute,
    /// The username or authzid uses an invalid `=` escape, or is empty.
    BadUsername,
    /// The client required a mandatory extension with `m=`.
    UnsupportedExtension,
    /// The client asked for channel binding with `p=`.
    ChannelBindingNotSupported,
    /// The `c=` attribute doesn’t match the GS2 header of the first message.
    BadChannelBinding,
    /// The `r=` attribute isn’t the nonce the server sent.
    NonceMismatch,
    /// Wrong username or password.
    NotAuthorized,
    /// The stored password was salted for another SCRAM variant.
    IncompatibleStoredPassword(DeriveError),
    /// The HMAC couldn’t be keyed.
    InvalidKeyLength(InvalidLength),
    /// No nonce or salt could be generated.
    RandomFailure(getrandom::Error),
}

impl ScramError {
    pub(crate) fn condition(&self) -> (ErrorCode, &'static str) {
        match self {
            ScramError::ParserFailed => (ErrorCode::BadProtocol, "Response decoding failed"),
            ScramError::BadAttribute => {
                (ErrorCode::BadProtocol, "Malformed or unexpected attribute")
            }
            ScramError::BadUsername => (ErrorCode::InvalidAuthzid, "Malformed username"),
            ScramError::UnsupportedExtension => (ErrorCode::BadProtocol, "Unsupported extension"),
            ScramError::ChannelBindingNotSupported => {
                (ErrorCode::BadProtocol, "Channel binding isn’t supported")
            }
            ScramError::BadChannelBinding => (ErrorCode::BadProtocol, "Invalid channel binding"),
            ScramError::NonceMismatch => (ErrorCode::BadProtocol, "Nonce mismatch"),
            ScramError::NotAuthorized => {
                (ErrorCode::NotAuthorized, "Invalid username or password")
            }
            ScramError::IncompatibleStoredPassword(_) => {
                (ErrorCode::InvalidMechanism, "Incompatible SCRAM methods")
            }
            ScramError::InvalidKeyLength(_) => {
                (ErrorCode::TemporaryAuthFailure, "Failed to compute a proof")
            }
            ScramError::RandomFailure(_) => (
                ErrorCode::TemporaryAuthFailure,
                "Failed to generate a nonce",
            ),
        }
    }
}

impl fmt::Display for ScramError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScramError::ParserFailed => write!(fmt, "failed to decode message"),
            ScramError::BadAttribute => write!(fmt, "malformed or unexpected attribute"),
            ScramError::BadUsername => write!(fmt, "malformed username"),
            ScramError::UnsupportedExtension => write!(fmt, "unsupported mandatory extension"),
            ScramError::ChannelBindingNotSupported => {
                write!(fmt, "channel binding not supported")
            }
            ScramError::BadChannelBinding => write!(fmt, "channel binding mismatch"),
            ScramError::NonceMismatch => write!(fmt, "nonce mismatch"),
            ScramError::NotAuthorized => write!(fmt, "invalid username or password"),
            ScramError::IncompatibleStoredPassword(err) => {
                write!(fmt, "incompatible stored password: {}", err)
            }
            ScramError::InvalidKeyLength(err) => write!(fmt, "invalid key length: {}", err),
            ScramError::RandomFailure(err) => write!(fmt, "failure to get random data: {}", err),
        }
    }
}

impl std::error::Error for ScramError {}

impl From<InvalidLength> for ScramError {
    fn from(err: InvalidLength) -> ScramError {
        ScramError::InvalidKeyLength(err)
    }
}

impl From<getrandom::Error> for ScramError {
    fn from(err: getrandom::Error) -> ScramError {
        ScramError::RandomFailure(err)
    }
}

impl From<DeriveError> for ScramError {
    fn from(err: DeriveError) -> ScramError {
        match err {
            DeriveError::InvalidLength(err) => ScramError::InvalidKeyLength(err),
            err => ScramError::IncompatibleStoredPassword(err),
        }
    }
}

/// A SCRAM mechanism over the hash function `S`, for instance
/// [`Sha1`](crate::common::scram::Sha1).
pub struct Scram<S> {
    _marker: PhantomData<fn() -> S>,
}

impl<S> Scram<S> {
    /// Creates the mechanism, usable in a static table.
    pub const fn new() -> Scram<S> {
        Scram {
            _marker: PhantomData,
        }
    }
}

impl<S> Default for Scram<S> {
    fn default() -> Scram<S> {
        Scram::new()
    }
}

impl<S: ScramProvider> Mechanism for Scram<S> {
    fn name(&self) -> &'static str {
        S::mechanism()
    }

    fn initialize(&self, session: &Session) -> Box<dyn MechanismState> {
        Box::new(ScramState::<S> {
            server_domain: session.server_domain().to_owned(),
            get_password: session.callbacks().get_password().clone(),
            stage: Stage::Init,
            _marker: PhantomData,
        })
    }
}

/// What the server remembers between its challenge and the client’s proof.
struct Challenge {
    gs2_header: String,
    client_first_bare: String,
    server_first: String,
    nonce: String,
    username: String,
    authzid: String,
    auth_module: String,
    salted_password: Vec<u8>,
}

enum Stage {
    Init,
    SentChallenge(Challenge),
}

struct ScramState<S> {
    server_domain: String,
    get_password: Arc<dyn PasswordProvider>,
    stage: Stage,
    _marker: PhantomData<fn() -> S>,
}

impl<S: ScramProvider> MechanismState for ScramState<S> {
    fn advance(mut self: Box<Self>, payload: &[u8]) -> Step {
        match std::mem::replace(&mut self.stage, Stage::Init) {
            Stage::Init => self.challenge(payload),
            Stage::SentChallenge(challenge) => verify::<S>(challenge, payload),
        }
    }
}

/// The parts of a client-first-message the server keeps.
struct ClientFirst<'a> {
    gs2_header: &'a str,
    authzid: Option<String>,
    username: String,
    nonce: &'a str,
    bare: &'a str,
}

impl<'a> ClientFirst<'a> {
    fn parse(payload: &'a [u8]) -> Result<ClientFirst<'a>, ScramError> {
        let message = std::str::from_utf8(payload).map_err(|_| ScramError::ParserFailed)?;
        let (cbind_flag, rest) = message.split_once(',').ok_or(ScramError::ParserFailed)?;
        let (authzid, bare) = rest.split_once(',').ok_or(ScramError::ParserFailed)?;
        match cbind_flag {
            "n" | "y" => (),
            flag if flag.starts_with("p=") => return Err(ScramError::ChannelBindingNotSupported),
            _ => return Err(ScramError::ParserFailed),
        }
        let authzid = match authzid {
            "" => None,
            authzid => match authzid.strip_prefix("a=") {
                Some(name) => Some(decode_saslname(name).ok_or(ScramError::BadUsername)?),
                None => return Err(ScramError::ParserFailed),
            },
        };
        let frame = parse_frame(bare.as_bytes()).ok_or(ScramError::ParserFailed)?;
        let (username, nonce) = match frame.as_slice() {
            [("m", _), ..] => return Err(ScramError::UnsupportedExtension),
            [("n", username), ("r", nonce), ..] if !nonce.is_empty() => (*username, *nonce),
            _ => return Err(ScramError::BadAttribute),
        };
        let username = decode_saslname(username).ok_or(ScramError::BadUsername)?;
        Ok(ClientFirst {
            gs2_header: &message[..message.len() - bare.len()],
            authzid,
            username,
            nonce,
            bare,
        })
    }
}

/// Decodes the `=2C` and `=3D` escapes of a SCRAM `saslname`.
fn decode_saslname(name: &str) -> Option<String> {
    let mut decoded = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(idx) = rest.find('=') {
        decoded.push_str(&rest[..idx]);
        match rest.get(idx + 1..idx + 3) {
            Some("2C") => decoded.push(','),
            Some("3D") => decoded.push('='),
            _ => return None,
        }
        rest = &rest[idx + 3..];
    }
    decoded.push_str(rest);
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

impl<S: ScramProvider> ScramState<S> {
    fn challenge(mut self: Box<Self>, payload: &[u8]) -> Step {
        let client_first = match ClientFirst::parse(payload) {
            Ok(client_first) => client_first,
            Err(err) => return Step::failed(err),
        };
        let username = client_first.username.as_str();
        let authzid = match client_first.authzid.as_deref() {
            None => username,
            Some(authzid) => match local_part(authzid, &self.server_domain) {
                Some(authzid) => authzid,
                None => return Step::failed_for(ScramError::NotAuthorized, username),
            },
        };
        let (password, auth_module) = match self.get_password.provide(username) {
            Ok(stored) => stored,
            Err(err) => {
                debug!("{} no password for {:?}: {}", S::mechanism(), username, err);
                return Step::failed_for(ScramError::NotAuthorized, username);
            }
        };
        let (salt, iterations, salted_password) = match salt_password::<S>(&password) {
            Ok(salted) => salted,
            Err(err) => {
                debug!(
                    "{} can’t salt the password of {:?}: {}",
                    S::mechanism(),
                    username,
                    err
                );
                return Step::failed_for(err, username);
            }
        };
        let nonce = match generate_nonce() {
            Ok(server_nonce) => format!("{}{}", client_first.nonce, server_nonce),
            Err(err) => return Step::failed_for(ScramError::RandomFailure(err), username),
        };
        let server_first = format!("r={},s={},i={}", nonce, Base64.encode(salt), iterations);
        self.stage = Stage::SentChallenge(Challenge {
            gs2_header: client_first.gs2_header.to_owned(),
            client_first_bare: client_first.bare.to_owned(),
            server_first: server_first.clone(),
            nonce,
            username: username.to_owned(),
            authzid: authzid.to_owned(),
            auth_module,
            salted_password,
        });
        Step::Continue(server_first.into_bytes(), self)
    }
}

/// Returns the salt, iteration count and salted password to use for `password`.
///
/// A plaintext password gets a fresh salt, a stored PBKDF2 digest keeps its own.
fn salt_password<S: ScramProvider>(
    password: &Password,
) -> Result<(Vec<u8>, u32, Vec<u8>), ScramError> {
    let (salt, iterations) = match password {
        Password::Plain(_) => (generate_salt()?, DEFAULT_ITERATIONS),
        Password::Pbkdf2 {
            salt, iterations, ..
        } => (salt.clone(), *iterations),
    };
    let salted_password = S::derive(password, &salt, iterations)?;
    Ok((salt, iterations, salted_password))
}

fn verify<S: ScramProvider>(challenge: Challenge, payload: &[u8]) -> Step {
    match server_final::<S>(&challenge, payload) {
        Ok(server_final) => Step::SuccessWithData(
            Properties::authenticated(
                &challenge.username,
                &challenge.authzid,
                S::mechanism(),
                &challenge.auth_module,
            ),
            server_final.into_bytes(),
        ),
        Err(err) => Step::failed_for(err, &challenge.username),
    }
}

/// Checks the client-final-message and computes the server-final-message.
fn server_final<S: ScramProvider>(
    challenge: &Challenge,
    payload: &[u8],
) -> Result<String, ScramError> {
    let message = std::str::from_utf8(payload).map_err(|_| ScramError::ParserFailed)?;
    let (without_proof, proof) = message
        .rsplit_once(",p=")
        .ok_or(ScramError::BadAttribute)?;
    let frame = parse_frame(without_proof.as_bytes()).ok_or(ScramError::ParserFailed)?;
    let (channel_binding, nonce) = match frame.as_slice() {
        [("c", channel_binding), ("r", nonce), ..] => (*channel_binding, *nonce),
        _ => return Err(ScramError::BadAttribute),
    };
    if channel_binding != Base64.encode(&challenge.gs2_header) {
        return Err(ScramError::BadChannelBinding);
    }
    if nonce != challenge.nonce {
        return Err(ScramError::NonceMismatch);
    }
    let proof = Base64.decode(proof).map_err(|_| ScramError::ParserFailed)?;

    let auth_message = format!(
        "{},{},{}",
        challenge.client_first_bare, challenge.server_first, without_proof
    );
    let client_key = S::hmac(b"Client Key", &challenge.salted_password)?;
    let stored_key = S::hash(&client_key);
    if proof.len() != client_key.len() {
        return Err(ScramError::NotAuthorized);
    }
    let client_signature = xor(&proof, &client_key);
    if !S::verify_hmac(auth_message.as_bytes(), &stored_key, &client_signature)? {
        return Err(ScramError::NotAuthorized);
    }
    let server_key = S::hmac(b"Server Key", &challenge.salted_password)?;
    let server_signature = S::hmac(auth_message.as_bytes(), &server_key)?;
    Ok(format!("v={}", Base64.encode(server_signature)))
}
