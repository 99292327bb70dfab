//! Types shared by the negotiation engine and the mechanisms.

use std::fmt;
use std::slice;

#[cfg(feature = "scram")]
#[cfg_attr(docsrs, doc(cfg(feature = "scram")))]
pub mod scram;

/// One key-tagged value reported by a mechanism on success.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Property {
    /// The authentication identity, as sent by the client.
    Username(String),
    /// The identity the client wants to act as; this is what gets validated.
    Authzid(String),
    /// The name of the mechanism which authenticated the client.
    Mechanism(String),
    /// Which credential backend validated the secret.
    AuthModule(String),
}

impl Property {
    /// The key of this property.
    pub fn key(&self) -> &'static str {
        match self {
            Property::Username(_) => "username",
            Property::Authzid(_) => "authzid",
            Property::Mechanism(_) => "mechanism",
            Property::AuthModule(_) => "auth_module",
        }
    }

    /// The value of this property.
    pub fn value(&self) -> &str {
        match self {
            Property::Username(value)
            | Property::Authzid(value)
            | Property::Mechanism(value)
            | Property::AuthModule(value) => value,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}={}", self.key(), self.value())
    }
}

/// The ordered property list of a successful authentication.
///
/// Keys may repeat, the accessors always return the first value found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

impl Properties {
    /// Creates an empty property list.
    pub fn new() -> Properties {
        Properties(Vec::new())
    }

    /// Appends a property, builder style.
    pub fn with(mut self, property: Property) -> Properties {
        self.0.push(property);
        self
    }

    /// Appends a property.
    pub fn push(&mut self, property: Property) {
        self.0.push(property);
    }

    /// Iterates over the properties in insertion order.
    pub fn iter(&self) -> slice::Iter<'_, Property> {
        self.0.iter()
    }

    /// Returns the number of properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this list contains no property at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first `username` value.
    pub fn username(&self) -> Option<&str> {
        self.iter().find_map(|p| match p {
            Property::Username(value) => Some(value.as_str()),
            _ => None,
        })
    }

    /// The first `authzid` value.
    pub fn authzid(&self) -> Option<&str> {
        self.iter().find_map(|p| match p {
            Property::Authzid(value) => Some(value.as_str()),
            _ => None,
        })
    }

    /// The first `mechanism` value.
    pub fn mechanism(&self) -> Option<&str> {
        self.iter().find_map(|p| match p {
            Property::Mechanism(value) => Some(value.as_str()),
            _ => None,
        })
    }

    /// The first `auth_module` value.
    pub fn auth_module(&self) -> Option<&str> {
        self.iter().find_map(|p| match p {
            Property::AuthModule(value) => Some(value.as_str()),
            _ => None,
        })
    }

    /// The property list every bundled mechanism reports on success.
    pub(crate) fn authenticated(
        username: &str,
        authzid: &str,
        mechanism: &str,
        auth_module: &str,
    ) -> Properties {
        Properties::new()
            .with(Property::Username(username.to_owned()))
            .with(Property::Authzid(authzid.to_owned()))
            .with(Property::Mechanism(mechanism.to_owned()))
            .with(Property::AuthModule(auth_module.to_owned()))
    }
}

impl FromIterator<Property> for Properties {
    fn from_iter<I: IntoIterator<Item = Property>>(iter: I) -> Properties {
        Properties(iter.into_iter().collect())
    }
}

impl IntoIterator for Properties {
    type Item = Property;
    type IntoIter = std::vec::IntoIter<Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = &'a Property;
    type IntoIter = slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
#[test]
fn xor_works() {
    assert_eq!(
        xor(
            &[135, 94, 53, 134, 73, 233, 140, 221, 150, 12, 96, 111, 54, 66, 11, 76],
            &[163, 9, 122, 180, 107, 44, 22, 252, 248, 134, 112, 82, 84, 122, 56, 209]
        ),
        &[36, 87, 79, 50, 34, 197, 154, 33, 110, 138, 16, 61, 98, 56, 51, 157]
    );
}

/// XORs two byte strings of the same length.
#[doc(hidden)]
pub fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(a, b)| a ^ b).collect()
}

/// Splits a comma-separated `key=value` frame, keeping the attribute order.
///
/// Returns `None` if the frame isn’t UTF-8 or an attribute lacks its `=`.
#[doc(hidden)]
pub fn parse_frame(frame: &[u8]) -> Option<Vec<(&str, &str)>> {
    let inner = std::str::from_utf8(frame).ok()?;
    inner.split(',').map(|s| s.split_once('=')).collect()
}

/// Returns the value of the first attribute named `key` in a parsed frame.
#[doc(hidden)]
pub fn attribute<'a>(frame: &[(&str, &'a str)], key: &str) -> Option<&'a str> {
    frame.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Lowercase hexadecimal encoding.
#[cfg(any(feature = "anonymous", feature = "digest-md5"))]
pub(crate) fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}
