//! Provides the SASL "DIGEST-MD5" mechanism, as described in RFC 2831.
//!
//! The exchange takes three rounds: the server sends a challenge carrying a nonce, the
//! client answers with a digest-response, the server proves it knows the password too
//! with `rspauth` and the client acknowledges with an empty response.

use getrandom::getrandom;
use log::debug;
use std::fmt;
use std::sync::Arc;

use super::local_part;
use crate::common::{hex, Properties};
use crate::server::{
    DigestValidator, ErrorCode, Mechanism, MechanismState, PasswordProvider, Session, Step,
};

/// Errors of the DIGEST-MD5 mechanism.
#[derive(Debug, PartialEq)]
pub enum DigestMd5Error {
    /// The digest-response couldn’t be parsed.
    ParserFailed,
    /// The digest-uri doesn’t designate this service on this server.
    InvalidDigestUri,
    /// The `nonce`, `nc` or `qop` directive isn’t the one the server offered.
    UnexpectedDirective,
    /// Wrong username or password.
    NotAuthorized,
    /// The client sent data instead of acknowledging `rspauth`.
    UnexpectedResponse,
    /// No nonce could be generated.
    RandomFailure(getrandom::Error),
}

impl DigestMd5Error {
    pub(crate) fn condition(&self) -> (ErrorCode, &'static str) {
        match self {
            DigestMd5Error::ParserFailed => (ErrorCode::BadProtocol, "Response decoding failed"),
            DigestMd5Error::InvalidDigestUri => (ErrorCode::MalformedRequest, "Invalid digest URI"),
            DigestMd5Error::UnexpectedDirective => (ErrorCode::BadProtocol, "Unexpected directive"),
            DigestMd5Error::NotAuthorized => {
                (ErrorCode::NotAuthorized, "Invalid username or password")
            }
            DigestMd5Error::UnexpectedResponse => (ErrorCode::BadProtocol, "Unexpected response"),
            DigestMd5Error::RandomFailure(_) => (
                ErrorCode::TemporaryAuthFailure,
                "Failed to generate a nonce",
            ),
        }
    }
}

impl fmt::Display for DigestMd5Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DigestMd5Error::ParserFailed => write!(fmt, "failed to decode response"),
            DigestMd5Error::InvalidDigestUri => write!(fmt, "invalid digest-uri"),
            DigestMd5Error::UnexpectedDirective => write!(fmt, "unexpected directive"),
            DigestMd5Error::NotAuthorized => write!(fmt, "invalid username or password"),
            DigestMd5Error::UnexpectedResponse => write!(fmt, "unexpected response"),
            DigestMd5Error::RandomFailure(err) => {
                write!(fmt, "failure to get random data: {}", err)
            }
        }
    }
}

impl std::error::Error for DigestMd5Error {}

/// The SASL DIGEST-MD5 mechanism.
pub struct DigestMd5;

impl Mechanism for DigestMd5 {
    fn name(&self) -> &'static str {
        "DIGEST-MD5"
    }

    fn initialize(&self, session: &Session) -> Box<dyn MechanismState> {
        Box::new(DigestMd5State {
            service: session.service().to_owned(),
            server_domain: session.server_domain().to_owned(),
            realm: session.realm().to_owned(),
            get_password: session.callbacks().get_password().clone(),
            check_password_digest: session.callbacks().check_password_digest().clone(),
            stage: Stage::Initial,
        })
    }
}

enum Stage {
    Initial,
    Challenged { nonce: String },
    Verified(Properties),
}

struct DigestMd5State {
    service: String,
    server_domain: String,
    realm: String,
    get_password: Arc<dyn PasswordProvider>,
    check_password_digest: Arc<dyn DigestValidator>,
    stage: Stage,
}

impl MechanismState for DigestMd5State {
    fn advance(mut self: Box<Self>, payload: &[u8]) -> Step {
        match std::mem::replace(&mut self.stage, Stage::Initial) {
            Stage::Initial => self.challenge(),
            Stage::Challenged { nonce } => self.verify(&nonce, payload),
            Stage::Verified(props) => {
                if payload.is_empty() {
                    Step::Success(props)
                } else {
                    Step::Failure(
                        DigestMd5Error::UnexpectedResponse.into(),
                        props.username().map(str::to_owned),
                    )
                }
            }
        }
    }
}

impl DigestMd5State {
    fn challenge(mut self: Box<Self>) -> Step {
        let mut rand = [0u8; 16];
        if let Err(err) = getrandom(&mut rand) {
            return Step::failed(DigestMd5Error::RandomFailure(err));
        }
        let nonce = hex(&rand);
        let mut challenge = String::new();
        if !self.realm.is_empty() {
            challenge += &format!("realm=\"{}\",", quote(&self.realm));
        }
        challenge += &format!(
            "nonce=\"{}\",qop=\"auth\",charset=utf-8,algorithm=md5-sess",
            nonce
        );
        self.stage = Stage::Challenged { nonce };
        Step::Continue(challenge.into_bytes(), self)
    }

    fn verify(mut self: Box<Self>, nonce: &str, payload: &[u8]) -> Step {
        let directives = match parse_directives(payload) {
            Some(directives) => directives,
            None => return Step::failed(DigestMd5Error::ParserFailed),
        };
        let username = match directive(&directives, "username") {
            Some(username) => username,
            None => return Step::failed(DigestMd5Error::ParserFailed),
        };
        if directive(&directives, "nonce") != Some(nonce)
            || directive(&directives, "nc") != Some("00000001")
            || directive(&directives, "qop").map_or(false, |qop| qop != "auth")
        {
            debug!("DIGEST-MD5 response doesn’t answer the challenge that was sent");
            return Step::failed_for(DigestMd5Error::UnexpectedDirective, username);
        }
        let digest_uri = directive(&directives, "digest-uri").unwrap_or_default();
        if !self.is_digest_uri_valid(digest_uri) {
            debug!("DIGEST-MD5 digest-uri {:?} rejected", digest_uri);
            return Step::failed_for(DigestMd5Error::InvalidDigestUri, username);
        }
        let raw_authzid = directive(&directives, "authzid").unwrap_or_default();
        let authzid = if raw_authzid.is_empty() {
            username
        } else {
            match local_part(raw_authzid, &self.server_domain) {
                Some(authzid) => authzid,
                None => return Step::failed_for(DigestMd5Error::NotAuthorized, username),
            }
        };
        let password = match self.get_password.provide(username) {
            Ok((password, _)) => password,
            Err(err) => {
                debug!("DIGEST-MD5 no password for {:?}: {}", username, err);
                return Step::failed_for(DigestMd5Error::NotAuthorized, username);
            }
        };
        let password = match password.plain() {
            Some(password) => password.to_owned(),
            None => {
                debug!("DIGEST-MD5 needs a plaintext password for {:?}", username);
                return Step::failed_for(DigestMd5Error::NotAuthorized, username);
            }
        };
        let digest = directive(&directives, "response").unwrap_or_default();
        let digest_gen = |password: &str| {
            response(&directives, username, password, nonce, raw_authzid, "AUTHENTICATE")
        };
        match self.check_password_digest.validate_digest(
            username,
            authzid,
            digest,
            &digest_gen,
        ) {
            Ok(auth_module) => {
                let rspauth = response(&directives, username, &password, nonce, raw_authzid, "");
                self.stage = Stage::Verified(Properties::authenticated(
                    username,
                    authzid,
                    "DIGEST-MD5",
                    &auth_module,
                ));
                Step::Continue(format!("rspauth={}", rspauth).into_bytes(), self)
            }
            Err(err) => {
                debug!("DIGEST-MD5 validation failed for {:?}: {}", username, err);
                Step::failed_for(DigestMd5Error::NotAuthorized, username)
            }
        }
    }

    /// Accepts `service/host` and `service/host/serv-name`.
    fn is_digest_uri_valid(&self, digest_uri: &str) -> bool {
        let mut parts = digest_uri.splitn(3, '/');
        parts.next() == Some(self.service.as_str())
            && parts.next() == Some(self.server_domain.as_str())
    }
}

fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn directive<'a>(directives: &'a [(String, String)], key: &str) -> Option<&'a str> {
    directives
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Parses a comma-separated list of `key=value` and `key="quoted value"` directives.
fn parse_directives(payload: &[u8]) -> Option<Vec<(String, String)>> {
    let input = std::str::from_utf8(payload).ok()?;
    let mut chars = input.chars().peekable();
    let mut directives = Vec::new();
    loop {
        while chars.next_if(|&c| c == ',' || c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }
        let mut key = String::new();
        while let Some(c) = chars.next_if(|&c| c != '=' && c != ',' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if key.is_empty() || chars.next() != Some('=') {
            return None;
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next()? {
                    '\\' => value.push(chars.next()?),
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|&c| c != ',' && !c.is_whitespace()) {
                value.push(c);
            }
        }
        directives.push((key, value));
    }
    Some(directives)
}

/// Computes the `response` (with `a2_prefix` = `AUTHENTICATE`) or `rspauth` (with an
/// empty prefix) value of RFC 2831, section 2.1.2.1, for `qop=auth`.
fn response(
    directives: &[(String, String)],
    username: &str,
    password: &str,
    nonce: &str,
    authzid: &str,
    a2_prefix: &str,
) -> String {
    let realm = directive(directives, "realm").unwrap_or_default();
    let cnonce = directive(directives, "cnonce").unwrap_or_default();
    let digest_uri = directive(directives, "digest-uri").unwrap_or_default();
    let nc = directive(directives, "nc").unwrap_or_default();

    let mut a1 = md5::compute(format!("{}:{}:{}", username, realm, password)).to_vec();
    a1.extend(format!(":{}:{}", nonce, cnonce).bytes());
    if !authzid.is_empty() {
        a1.extend(format!(":{}", authzid).bytes());
    }
    let a2 = format!("{}:{}", a2_prefix, digest_uri);
    let kd = format!(
        "{:x}:{}:{}:{}:auth:{:x}",
        md5::compute(&a1),
        nonce,
        nc,
        cnonce,
        md5::compute(a2)
    );
    format!("{:x}", md5::compute(kd))
}
