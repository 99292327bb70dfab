//! The mechanisms of the default [`Registry`](super::Registry).

#[cfg(feature = "anonymous")]
mod anonymous;
#[cfg(feature = "digest-md5")]
mod digest_md5;
mod oauth;
mod plain;
#[cfg(feature = "scram")]
mod scram;

#[cfg(feature = "anonymous")]
#[cfg_attr(docsrs, doc(cfg(feature = "anonymous")))]
pub use self::anonymous::{Anonymous, AnonymousError};
#[cfg(feature = "digest-md5")]
#[cfg_attr(docsrs, doc(cfg(feature = "digest-md5")))]
pub use self::digest_md5::{DigestMd5, DigestMd5Error};
pub use self::oauth::{OAuth, OAuthError};
pub use self::plain::{Plain, PlainError};
#[cfg(feature = "scram")]
#[cfg_attr(docsrs, doc(cfg(feature = "scram")))]
pub use self::scram::{Scram, ScramError};

/// Strips `@server_domain` from a client-supplied identity.
///
/// Returns `None` when the identity names another domain.
pub(crate) fn local_part<'a>(identity: &'a str, server_domain: &str) -> Option<&'a str> {
    match identity.split_once('@') {
        Some((node, domain)) if domain == server_domain => Some(node),
        Some(_) => None,
        None => Some(identity),
    }
}

#[cfg(test)]
#[test]
fn local_part_works() {
    assert_eq!(local_part("alice", "example.com"), Some("alice"));
    assert_eq!(local_part("alice@example.com", "example.com"), Some("alice"));
    assert_eq!(local_part("alice@example.org", "example.com"), None);
}
