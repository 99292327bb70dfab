use stringprep::nodeprep;

/// Maps a raw identity to its canonical form.
pub trait IdentityNormalizer: Send + Sync {
    /// Returns the canonical form of `identity`, or `None` if it’s not acceptable.
    fn normalize(&self, identity: &str) -> Option<String>;
}

/// Normalizes identities as JID nodeparts, using the nodeprep profile of stringprep.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nodeprep;

impl IdentityNormalizer for Nodeprep {
    fn normalize(&self, identity: &str) -> Option<String> {
        let node = nodeprep(identity).ok()?;
        if node.len() > 1023 {
            None
        } else {
            Some(node.into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_folds() {
        assert_eq!(Nodeprep.normalize("Alice"), Some(String::from("alice")));
        assert_eq!(Nodeprep.normalize("Test™"), Some(String::from("testtm")));
    }

    #[test]
    fn rejects_prohibited() {
        assert_eq!(Nodeprep.normalize("alice@example.com"), None);
        assert_eq!(Nodeprep.normalize("a\"b"), None);
        assert_eq!(Nodeprep.normalize("a/b"), None);
    }

    #[test]
    fn may_map_to_nothing() {
        assert_eq!(Nodeprep.normalize(""), Some(String::new()));
        assert_eq!(Nodeprep.normalize("\u{00AD}"), Some(String::new()));
    }

    #[test]
    fn too_long() {
        let long = "a".repeat(1024);
        assert_eq!(Nodeprep.normalize(&long), None);
        assert!(Nodeprep.normalize(&long[..1023]).is_some());
    }
}
