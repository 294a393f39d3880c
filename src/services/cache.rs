use std::collections::HashMap;
use std::sync::RwLock;

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::models::NluResult;

const NO_OPTIONS: &str = "<none>";

/// Process-lifetime memo of resolver outcomes. Entries are never evicted.
#[derive(Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, NluResult>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable digest of the normalized message, the target field and the sorted options.
    pub fn key(message: &str, field: &str, options: &[String]) -> String {
        let options = if options.is_empty() {
            NO_OPTIONS.to_string()
        } else {
            let mut sorted: Vec<&str> = options.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            serde_json::to_string(&sorted).unwrap_or_else(|_| sorted.join("\u{1f}"))
        };

        let mut hasher = Sha1::new();
        hasher.update(message.trim().to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
        hasher.update(options.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<NluResult> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    pub fn put(&self, key: String, result: NluResult) {
        match self.entries.write() {
            Ok(mut entries) => {
                entries.insert(key, result);
            }
            Err(_) => tracing::error!("response cache lock poisoned, skipping insert"),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_normalizes_message_and_option_order() {
        let a = ResponseCache::key("  Cardiologia ", "especialidade", &["B".into(), "A".into()]);
        let b = ResponseCache::key("cardiologia", "especialidade", &["A".into(), "B".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_distinguishes_field_and_options() {
        let base = ResponseCache::key("sim", "confirmado", &[]);
        assert_ne!(base, ResponseCache::key("sim", "email", &[]));
        assert_ne!(base, ResponseCache::key("sim", "confirmado", &["sim".into()]));
    }

    #[test]
    fn test_put_then_get() {
        let cache = ResponseCache::new();
        let key = ResponseCache::key("Maria", "nome", &[]);
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), NluResult::accepted("Maria"));
        assert_eq!(cache.get(&key), Some(NluResult::accepted("Maria")));
        assert_eq!(cache.len(), 1);
    }
}
