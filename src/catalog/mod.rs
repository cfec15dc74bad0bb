/*!
Namespace identifiers. Grounded on the teacher's `catalog::namespace::Namespace`
and `catalog::table_identifier::TableIdentifier`, collapsed into a single
validated newtype since ParqueDB namespaces are flat (no nested catalog
levels) — a namespace is simply the table name used throughout spec §3's
storage layout.
*/

use core::fmt::{self, Display};

use crate::error::{ParqueError, Result};

/// A validated namespace (table/collection) name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Validate and wrap a namespace name. Namespaces must be non-empty and
    /// must not contain `/`, since `/` separates the namespace from the ULID
    /// in an entity's `$id`.
    pub fn try_new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ParqueError::Other(anyhow::anyhow!(
                "namespace name must not be empty"
            )));
        }
        if name.contains('/') {
            return Err(ParqueError::Other(anyhow::anyhow!(
                "namespace name must not contain '/': {name}"
            )));
        }
        Ok(Namespace(name))
    }

    /// Borrow the namespace as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_slashed_names() {
        assert!(Namespace::try_new("").is_err());
        assert!(Namespace::try_new("a/b").is_err());
        assert!(Namespace::try_new("users").is_ok());
    }
}
