//! API key lookup for the balance endpoint.

use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Error;

pub trait ApiKeyStore: Send + Sync {
    /// Whether requests must present a key at all
    fn is_enforced(&self) -> bool;

    /// Canonical form of `api_key` if it is active
    fn resolve(&self, api_key: &str) -> Option<Uuid>;

    fn is_active(&self, api_key: &str) -> bool {
        self.resolve(api_key).is_some()
    }
}

/// Keys fixed at startup, stored in canonical hyphenated form
#[derive(Debug, Default, Clone)]
pub struct StaticApiKeyStore {
    keys: HashSet<Uuid>,
}

impl StaticApiKeyStore {
    pub fn from_keys<I, S>(keys: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .map(|key| {
                let key = key.as_ref().trim();
                Uuid::parse_str(key).map_err(|_| {
                    Error::Configuration(format!("API key '{}' is not a valid UUID", key))
                })
            })
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl ApiKeyStore for StaticApiKeyStore {
    fn is_enforced(&self) -> bool {
        !self.keys.is_empty()
    }

    fn resolve(&self, api_key: &str) -> Option<Uuid> {
        Uuid::parse_str(api_key.trim())
            .ok()
            .filter(|key| self.keys.contains(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_key_is_active() {
        let store = StaticApiKeyStore::from_keys(["550e8400-e29b-41d4-a716-446655440000"]).unwrap();
        assert!(store.is_enforced());
        assert!(store.is_active("550e8400-e29b-41d4-a716-446655440000"));
        // The simple and uppercase forms parse to the same UUID.
        assert!(store.is_active("550E8400E29B41D4A716446655440000"));
        assert!(!store.is_active("550e8400-e29b-41d4-a716-446655440001"));
        assert!(!store.is_active("garbage"));
    }

    #[test]
    fn test_resolve_canonicalizes_key_forms() {
        let store = StaticApiKeyStore::from_keys(["550e8400-e29b-41d4-a716-446655440000"]).unwrap();
        let hyphenated = store.resolve("550e8400-e29b-41d4-a716-446655440000");
        assert!(hyphenated.is_some());
        assert_eq!(store.resolve("550E8400E29B41D4A716446655440000"), hyphenated);
        assert_eq!(store.resolve("urn:uuid:550e8400-e29b-41d4-a716-446655440000"), hyphenated);
        assert_eq!(store.resolve("550e8400-e29b-41d4-a716-446655440001"), None);
    }

    #[test]
    fn test_empty_store_is_not_enforced() {
        let store = StaticApiKeyStore::from_keys(Vec::<String>::new()).unwrap();
        assert!(!store.is_enforced());
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_key_rejected() {
        assert!(StaticApiKeyStore::from_keys(["nope"]).is_err());
    }
}
