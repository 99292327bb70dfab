//! Credential store and mechanisms used by the tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{
    Callbacks, DigestValidator, IdentityNormalizer, Mechanism, MechanismState, Nodeprep,
    PasswordProvider, PasswordValidator, ProviderError, Session, Step, TokenValidator,
    ValidatorError,
};
use crate::common::Properties;
use crate::secret::Password;

pub(crate) const AUTH_MODULE: &str = "memory";

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Users and tokens kept in memory.
#[derive(Default)]
pub(crate) struct MemoryStore {
    passwords: HashMap<String, Password>,
    tokens: HashMap<String, String>,
}

impl MemoryStore {
    pub(crate) fn with_user(mut self, username: &str, password: Password) -> MemoryStore {
        self.passwords.insert(username.to_owned(), password);
        self
    }

    pub(crate) fn with_token(mut self, username: &str, token: &str) -> MemoryStore {
        self.tokens.insert(username.to_owned(), token.to_owned());
        self
    }
}

impl PasswordProvider for MemoryStore {
    fn provide(&self, username: &str) -> Result<(Password, String), ProviderError> {
        match self.passwords.get(username) {
            Some(password) => Ok((password.clone(), AUTH_MODULE.to_owned())),
            None => Err(ProviderError::UnknownUser),
        }
    }
}

impl PasswordValidator for MemoryStore {
    fn validate(
        &self,
        username: &str,
        _authzid: &str,
        password: &str,
    ) -> Result<String, ValidatorError> {
        let (stored, module) = self.provide(username)?;
        if stored.plain() == Some(password) {
            Ok(module)
        } else {
            Err(ValidatorError::AuthenticationFailed)
        }
    }
}

impl DigestValidator for MemoryStore {
    fn validate_digest(
        &self,
        username: &str,
        _authzid: &str,
        digest: &str,
        digest_gen: &dyn Fn(&str) -> String,
    ) -> Result<String, ValidatorError> {
        let (stored, module) = self.provide(username)?;
        match stored.plain() {
            Some(password) if digest_gen(password) == digest => Ok(module),
            _ => Err(ValidatorError::AuthenticationFailed),
        }
    }
}

impl TokenValidator for MemoryStore {
    fn validate_token(
        &self,
        username: &str,
        _server: &str,
        scope: &[&str],
        token: &str,
    ) -> Result<String, ValidatorError> {
        match self.tokens.get(username) {
            Some(stored) if stored == token && scope.contains(&"sasl_auth") => {
                Ok(String::from("oauth"))
            }
            _ => Err(ValidatorError::AuthenticationFailed),
        }
    }
}

pub(crate) fn store() -> MemoryStore {
    MemoryStore::default()
        .with_user("alice", Password::from("secret"))
        .with_user("\u{00AD}", Password::from("hyphen"))
        .with_user("user", Password::from("pencil"))
        .with_user("chris", Password::from("secret"))
        .with_token("alice", "token-alice")
}

pub(crate) fn callbacks_for(store: MemoryStore) -> Callbacks {
    let store = Arc::new(store);
    Callbacks::new(store.clone(), store.clone(), store.clone()).with_token_validator(store)
}

pub(crate) fn callbacks() -> Callbacks {
    callbacks_for(store())
}

pub(crate) fn session() -> Session {
    init_logger();
    Session::new("xmpp", "example.com", "", callbacks())
}

/// Rejects one identity, defers to nodeprep for the rest.
pub(crate) struct Rejecting(pub(crate) &'static str);

impl IdentityNormalizer for Rejecting {
    fn normalize(&self, identity: &str) -> Option<String> {
        if identity == self.0 {
            None
        } else {
            Nodeprep.normalize(identity)
        }
    }
}

fn authenticated(payload: &[u8], mechanism: &str) -> Properties {
    let identity = String::from_utf8_lossy(payload);
    Properties::authenticated(&identity, &identity, mechanism, AUTH_MODULE)
}

/// Authenticates the payload as identity right away.
pub(crate) struct OneRound;

impl Mechanism for OneRound {
    fn name(&self) -> &'static str {
        "X-ONE-ROUND"
    }

    fn initialize(&self, _session: &Session) -> Box<dyn MechanismState> {
        Box::new(OneRound)
    }
}

impl MechanismState for OneRound {
    fn advance(self: Box<Self>, payload: &[u8]) -> Step {
        Step::Success(authenticated(payload, "X-ONE-ROUND"))
    }
}

/// Takes the identity first, then succeeds with trailing data if the client asks for
/// it with `with-data`.
pub(crate) struct TwoRound;

enum TwoRoundState {
    Initial,
    Challenged(Vec<u8>),
}

impl Mechanism for TwoRound {
    fn name(&self) -> &'static str {
        "X-TWO-ROUND"
    }

    fn initialize(&self, _session: &Session) -> Box<dyn MechanismState> {
        Box::new(TwoRoundState::Initial)
    }
}

impl MechanismState for TwoRoundState {
    fn advance(self: Box<Self>, payload: &[u8]) -> Step {
        match *self {
            TwoRoundState::Initial => Step::Continue(
                b"ready".to_vec(),
                Box::new(TwoRoundState::Challenged(payload.to_vec())),
            ),
            TwoRoundState::Challenged(identity) => {
                let props = authenticated(&identity, "X-TWO-ROUND");
                if payload == b"with-data" {
                    Step::SuccessWithData(props, b"final".to_vec())
                } else {
                    Step::Success(props)
                }
            }
        }
    }
}

pub(crate) static TEST_MECHANISMS: &[&dyn Mechanism] = &[&OneRound, &TwoRound];

static COUNTED: AtomicUsize = AtomicUsize::new(0);

/// Like [`OneRound`], counting how often it got initialized.
pub(crate) struct Counted;

impl Mechanism for Counted {
    fn name(&self) -> &'static str {
        "X-COUNTED"
    }

    fn initialize(&self, _session: &Session) -> Box<dyn MechanismState> {
        COUNTED.fetch_add(1, Ordering::SeqCst);
        Box::new(OneRound)
    }
}

/// Only one test may use [`COUNTED_MECHANISMS`].
pub(crate) fn counted_initializations() -> usize {
    COUNTED.load(Ordering::SeqCst)
}

pub(crate) static COUNTED_MECHANISMS: &[&dyn Mechanism] = &[&Counted];
