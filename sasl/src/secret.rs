//! Shapes a credential backend can hand out for a user.

/// A stored password, as returned by a [`PasswordProvider`](crate::server::PasswordProvider).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Password {
    /// A plaintext password.
    Plain(String),
    /// A password digest derived using PBKDF2, also known as a SCRAM salted password.
    Pbkdf2 {
        /// Name of the hash function, for instance `SHA-1` or `SHA-256`.
        method: String,
        /// The salt used during derivation.
        salt: Vec<u8>,
        /// The iteration count used during derivation.
        iterations: u32,
        /// The derived key.
        data: Vec<u8>,
    },
}

impl Password {
    /// Builds a PBKDF2 stored password.
    pub fn pbkdf2<S: Into<String>>(
        method: S,
        salt: Vec<u8>,
        iterations: u32,
        data: Vec<u8>,
    ) -> Password {
        Password::Pbkdf2 {
            method: method.into(),
            salt,
            iterations,
            data,
        }
    }

    /// Returns the plaintext, if this password is stored as such.
    pub fn plain(&self) -> Option<&str> {
        match self {
            Password::Plain(plain) => Some(plain),
            Password::Pbkdf2 { .. } => None,
        }
    }
}

impl From<String> for Password {
    fn from(s: String) -> Password {
        Password::Plain(s)
    }
}

impl<'a> From<&'a str> for Password {
    fn from(s: &'a str) -> Password {
        Password::Plain(s.to_owned())
    }
}
