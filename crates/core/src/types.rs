use serde::{Deserialize, Serialize};
use std::fmt;

/// A realm identifier for multi-tenant isolation.
///
/// Ids appear verbatim as segments of colon-delimited state keys and
/// therefore must not contain ':'; realm admission rejects such ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealmId(String);

impl RealmId {
    /// Create a new instance from a string value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Return the inner string as a str slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RealmId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RealmId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl std::ops::Deref for RealmId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RealmId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realm_id_from_str() {
        let id = RealmId::from("realm-7");
        assert_eq!(id.as_str(), "realm-7");
        assert_eq!(&*id, "realm-7");
    }

    #[test]
    fn realm_id_from_string() {
        let id = RealmId::from("realm-42".to_string());
        assert_eq!(id.to_string(), "realm-42");
    }

    #[test]
    fn realm_id_serde_roundtrip() {
        let id = RealmId::new("realm-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"realm-123\"");
        let back: RealmId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
