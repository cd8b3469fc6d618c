//! Namespaced counter keys.

/// The store key addressing one identifier's counter.
///
/// Composed of a fixed namespace prefix and the raw identifier, so repeated
/// checks for the same identifier always hit the same record and never
/// collide with unrelated keys in a shared store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    key: String,
    prefix_len: usize,
}

impl CounterKey {
    pub fn new(prefix: &str, identifier: &str) -> Self {
        let mut key = String::with_capacity(prefix.len() + identifier.len());
        key.push_str(prefix);
        key.push_str(identifier);

        Self {
            key,
            prefix_len: prefix.len(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The identifier without its namespace.
    pub fn identifier(&self) -> &str {
        &self.key[self.prefix_len..]
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_key_creation() {
        let key = CounterKey::new("netrecon:rl:", "1.2.3.4");

        assert_eq!(key.as_str(), "netrecon:rl:1.2.3.4");
        assert_eq!(key.identifier(), "1.2.3.4");
        assert_eq!(key.to_string(), "netrecon:rl:1.2.3.4");
    }

    #[test]
    fn test_counter_key_equality() {
        let key1 = CounterKey::new("netrecon:rl:", "client_a");
        let key2 = CounterKey::new("netrecon:rl:", "client_a");
        let key3 = CounterKey::new("other:", "client_a");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_empty_identifier_is_still_namespaced() {
        let key = CounterKey::new("netrecon:rl:", "");
        assert_eq!(key.as_str(), "netrecon:rl:");
        assert_eq!(key.identifier(), "");
    }
}
