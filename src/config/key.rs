//! Routing keys.
//!
//! A routing key selects one sub-tree of a shared config file, e.g.
//! `"echo-client/echo-server"`.

use std::collections::HashMap;

use crate::config::monitor::MonitorError;

/// Separator between the client and server part of a key.
pub const KEY_SEPARATOR: char = '/';

/// A parsed routing key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Key {
    pub client_name: String,
    pub server_name: String,
    pub tags: HashMap<String, String>,
}

/// Builds and parses routing keys.
pub trait KeyProvider: Send + Sync {
    fn key(&self, from: &str, to: &str) -> String;
    fn parse_key(&self, key: &str) -> Result<Key, MonitorError>;
}

/// `"<from>/<to>"` keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyProvider;

impl KeyProvider for DefaultKeyProvider {
    fn key(&self, from: &str, to: &str) -> String {
        let mut key = String::with_capacity(from.len() + to.len() + 1);
        key.push_str(from);
        key.push(KEY_SEPARATOR);
        key.push_str(to);
        key
    }

    fn parse_key(&self, key: &str) -> Result<Key, MonitorError> {
        let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        match parts.as_slice() {
            [client, server] => Ok(Key {
                client_name: client.to_string(),
                server_name: server.to_string(),
                tags: HashMap::new(),
            }),
            _ => Err(MonitorError::InvalidKey(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip() {
        let provider = DefaultKeyProvider;
        let key = provider.key("ClientName", "ServiceName");
        assert_eq!(key, "ClientName/ServiceName");

        let parsed = provider.parse_key(&key).unwrap();
        assert_eq!(parsed.client_name, "ClientName");
        assert_eq!(parsed.server_name, "ServiceName");
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn test_parse_key_rejects_wrong_arity() {
        let provider = DefaultKeyProvider;
        assert!(matches!(provider.parse_key("single"), Err(MonitorError::InvalidKey(_))));
        assert!(matches!(provider.parse_key("a/b/c"), Err(MonitorError::InvalidKey(_))));
    }
}
