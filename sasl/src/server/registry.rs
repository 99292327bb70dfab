use std::fmt;

#[cfg(feature = "anonymous")]
use super::mechanisms::Anonymous;
#[cfg(feature = "digest-md5")]
use super::mechanisms::DigestMd5;
#[cfg(feature = "scram")]
use super::mechanisms::Scram;
use super::mechanisms::{OAuth, Plain};
use super::{ErrorCode, ErrorContext, ErrorReason, Mechanism};
#[cfg(feature = "scram")]
use crate::common::scram::{Sha1, Sha256};

/// Every mechanism this crate implements, in advertisement order.
static MECHANISMS: &[&dyn Mechanism] = &[
    #[cfg(feature = "anonymous")]
    &Anonymous,
    #[cfg(feature = "digest-md5")]
    &DigestMd5,
    &Plain,
    #[cfg(feature = "scram")]
    &Scram::<Sha1>::new(),
    #[cfg(feature = "scram")]
    &Scram::<Sha256>::new(),
    &OAuth,
];

/// Maps mechanism names to their implementation.
#[derive(Clone)]
pub struct Registry {
    mechanisms: &'static [&'static dyn Mechanism],
    disabled: Vec<String>,
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new(MECHANISMS)
    }
}

impl Registry {
    /// Creates a registry over a custom table, listed in its order.
    pub fn new(mechanisms: &'static [&'static dyn Mechanism]) -> Registry {
        Registry {
            mechanisms,
            disabled: Vec::new(),
        }
    }

    /// Stops offering and accepting the mechanism called `name`, ignoring case.
    pub fn without<N: Into<String>>(mut self, name: N) -> Registry {
        self.disabled.push(name.into());
        self
    }

    fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|disabled| disabled.eq_ignore_ascii_case(name))
    }

    /// The names to advertise, in a stable order.
    pub fn list_mechanisms(&self) -> Vec<&'static str> {
        self.mechanisms
            .iter()
            .map(|mechanism| mechanism.name())
            .filter(|name| !self.is_disabled(name))
            .collect()
    }

    /// Finds the mechanism a client selected, the name is case-sensitive.
    pub fn resolve(&self, name: &str) -> Option<&'static dyn Mechanism> {
        if self.is_disabled(name) {
            return None;
        }
        self.lookup(name)
    }

    /// Like [`resolve`](Registry::resolve) but disabled mechanisms still count.
    fn lookup(&self, name: &str) -> Option<&'static dyn Mechanism> {
        self.mechanisms
            .iter()
            .copied()
            .find(|mechanism| mechanism.name() == name)
    }

    /// Renders any [`ErrorReason`], see [`format_error`](super::format_error).
    pub fn format_error<'a, C: Into<ErrorContext<'a>>>(
        &self,
        context: C,
        reason: &ErrorReason,
    ) -> (ErrorCode, &'static str) {
        if let Some(condition) = reason.core_condition() {
            return condition;
        }
        let mechanism = match context.into() {
            ErrorContext::Negotiation(negotiation) => Some(negotiation.plugin()),
            ErrorContext::Mechanism(name) => self.lookup(name),
        };
        match (mechanism, reason) {
            (Some(mechanism), ErrorReason::Mechanism(err)) => mechanism.format_error(err),
            _ => super::error::UNSUPPORTED_MECHANISM,
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Registry")
            .field("mechanisms", &self.list_mechanisms())
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// The names of every mechanism of the default registry, in advertisement order.
pub fn list_mechanisms() -> Vec<&'static str> {
    Registry::default().list_mechanisms()
}
