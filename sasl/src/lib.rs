#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! This crate provides the server side of SASL authentication: a negotiation engine which
//! drives any registered mechanism, and the PLAIN, ANONYMOUS, DIGEST-MD5, SCRAM-SHA-1,
//! SCRAM-SHA-256 and X-OAUTH2 mechanisms.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use sasl_negotiation::secret::Password;
//! use sasl_negotiation::server::{
//!     Callbacks, DigestValidator, PasswordProvider, PasswordValidator, ProviderError,
//!     ValidatorError,
//! };
//! use sasl_negotiation::{format_error, ErrorCode, Outcome, Session};
//!
//! struct Backend;
//!
//! impl PasswordProvider for Backend {
//!     fn provide(&self, username: &str) -> Result<(Password, String), ProviderError> {
//!         match username {
//!             "user" => Ok((Password::from("pencil"), String::from("internal"))),
//!             _ => Err(ProviderError::UnknownUser),
//!         }
//!     }
//! }
//!
//! impl PasswordValidator for Backend {
//!     fn validate(&self, username: &str, _: &str, password: &str) -> Result<String, ValidatorError> {
//!         let (stored, module) = self.provide(username)?;
//!         match stored.plain() {
//!             Some(stored) if stored == password => Ok(module),
//!             _ => Err(ValidatorError::AuthenticationFailed),
//!         }
//!     }
//! }
//!
//! impl DigestValidator for Backend {
//!     fn validate_digest(
//!         &self,
//!         username: &str,
//!         _: &str,
//!         digest: &str,
//!         digest_gen: &dyn Fn(&str) -> String,
//!     ) -> Result<String, ValidatorError> {
//!         let (stored, module) = self.provide(username)?;
//!         match stored.plain() {
//!             Some(stored) if digest_gen(stored) == digest => Ok(module),
//!             _ => Err(ValidatorError::AuthenticationFailed),
//!         }
//!     }
//! }
//!
//! let backend = Arc::new(Backend);
//! let callbacks = Callbacks::new(backend.clone(), backend.clone(), backend);
//! let session = Session::new("xmpp", "example.com", "", callbacks);
//! assert!(session.list_mechanisms().contains(&"PLAIN"));
//!
//! match session.start("PLAIN", b"\0user\0pencil") {
//!     Outcome::Success(props) => assert_eq!(props.username(), Some("user")),
//!     _ => panic!("user should be authenticated"),
//! }
//!
//! match session.start("PLAIN", b"\0user\0wrong") {
//!     Outcome::Failure(reason, username) => {
//!         assert_eq!(username.as_deref(), Some("user"));
//!         assert_eq!(
//!             format_error("PLAIN", &reason),
//!             (ErrorCode::NotAuthorized, "Invalid username or password")
//!         );
//!     }
//!     _ => panic!("the password is wrong"),
//! }
//! ```
//!
//! # Usage
//!
//! You can use this in your crate by adding this under `dependencies` in your `Cargo.toml`:
//!
//! ```toml,ignore
//! sasl-negotiation = "*"
//! ```

pub mod common;
pub mod secret;
pub mod server;

pub use crate::common::{Properties, Property};
pub use crate::server::{
    format_error, list_mechanisms, ErrorCode, ErrorContext, ErrorReason, Negotiation, Outcome,
    Registry, Session,
};
