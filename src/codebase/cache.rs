use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::{Codebase, CodebaseError, CodebaseLoader, Language};

const LATEST: &str = "latest";

type CacheKey = (String, String);

/// Bounded LRU of materialized codebases keyed by `(identifier, commit)`.
///
/// The lock is only held for lookup and insert, never across a clone.
pub struct CodebaseCache {
    loader: Arc<dyn CodebaseLoader>,
    entries: Mutex<LruCache<CacheKey, Arc<Codebase>>>,
}

impl CodebaseCache {
    pub fn new(loader: Arc<dyn CodebaseLoader>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            loader,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    #[instrument(skip(self), fields(identifier = %identifier))]
    pub async fn get_codebase(
        &self,
        identifier: &str,
        language: Option<Language>,
        commit: Option<&str>,
    ) -> Result<Arc<Codebase>, CodebaseError> {
        let key = (identifier.to_string(), commit.unwrap_or(LATEST).to_string());

        if let Some(hit) = self.entries.lock().await.get(&key) {
            debug!(commit = %key.1, "codebase cache hit");
            return Ok(Arc::clone(hit));
        }

        let language = language.unwrap_or_else(|| Language::guess_from_name(identifier));
        let codebase = Arc::new(self.loader.load(identifier, language, commit).await?);

        let mut entries = self.entries.lock().await;
        // push hands back either the replaced value for this key or the LRU victim
        if let Some((evicted, _)) = entries.push(key.clone(), Arc::clone(&codebase)) {
            if evicted != key {
                info!(evicted = %evicted.0, commit = %evicted.1, "evicted codebase from cache");
            }
        }
        Ok(codebase)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
