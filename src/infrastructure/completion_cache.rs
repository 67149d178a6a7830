use crate::infrastructure::error::InfraError;
use std::collections::HashMap;
use std::sync::Mutex;

// Completion responses are cached by (prompt, model) with no eviction and no
// TTL: entries live as long as the owning gateway instance, which is one
// application session. Duplicate requests for identical input are served
// from memory; staleness is an accepted tradeoff.

pub trait CompletionCacheRepository: Send + Sync {
    fn get(&self, prompt: &str, model: &str) -> Result<Option<String>, InfraError>;
    fn put(&self, prompt: &str, model: &str, content: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCompletionCache {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl CompletionCacheRepository for InMemoryCompletionCache {
    fn get(&self, prompt: &str, model: &str) -> Result<Option<String>, InfraError> {
        let entries = self.entries.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("completion cache lock poisoned: {error}"))
        })?;
        Ok(entries.get(&(prompt.to_string(), model.to_string())).cloned())
    }

    fn put(&self, prompt: &str, model: &str, content: &str) -> Result<(), InfraError> {
        let mut entries = self.entries.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("completion cache lock poisoned: {error}"))
        })?;
        entries.insert(
            (prompt.to_string(), model.to_string()),
            content.to_string(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_what_put_stored() {
        let cache = InMemoryCompletionCache::default();
        cache
            .put("prompt-a", "model-x", "{\"ok\":true}")
            .expect("put");
        let hit = cache.get("prompt-a", "model-x").expect("get");
        assert_eq!(hit.as_deref(), Some("{\"ok\":true}"));
    }

    #[test]
    fn entries_are_keyed_by_prompt_and_model() {
        let cache = InMemoryCompletionCache::default();
        cache.put("prompt-a", "model-x", "first").expect("put");
        assert!(cache.get("prompt-a", "model-y").expect("get").is_none());
        assert!(cache.get("prompt-b", "model-x").expect("get").is_none());
        assert!(cache.get("prompt-a", "model-x").expect("get").is_some());
    }
}
