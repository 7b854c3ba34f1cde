// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    collections::{HashMap, hash_map},
    path::PathBuf,
    sync::Arc,
};

use imgcache_store::KvStore;
use jiff::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::{
    error::{Result, SerializationSnafu},
    key::ContentKey,
};

/// One successfully cached resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Locator the file was downloaded from
    pub remote_locator: String,
    /// Published file. May have been deleted behind the cache's back.
    pub local_path:     PathBuf,
    /// Unix timestamp when the file was published
    pub created_at:     i64,
}

impl CacheEntry {
    pub fn new(remote_locator: impl Into<String>, local_path: PathBuf) -> Self {
        Self {
            remote_locator: remote_locator.into(),
            local_path,
            created_at: Timestamp::now().as_second(),
        }
    }
}

/// Mapping from content key to cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index {
    entries: HashMap<ContentKey, CacheEntry>,
}

impl Index {
    #[must_use]
    pub fn get(&self, key: &ContentKey) -> Option<&CacheEntry> { self.entries.get(key) }

    pub fn insert(&mut self, key: ContentKey, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(key, entry)
    }

    pub fn remove(&mut self, key: &ContentKey) -> Option<CacheEntry> { self.entries.remove(key) }

    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> hash_map::Iter<'_, ContentKey, CacheEntry> { self.entries.iter() }

    pub fn values(&self) -> hash_map::Values<'_, ContentKey, CacheEntry> { self.entries.values() }
}

/// Persists the [`Index`] as one JSON blob and memoizes it.
///
/// The blob is read from storage at most once per store; afterwards the
/// in-memory copy is authoritative. `save` always writes the whole index.
pub struct IndexStore {
    store:       Arc<dyn KvStore>,
    storage_key: String,
    memo:        OnceCell<RwLock<Index>>,
    /// Serializes read-modify-write cycles so concurrent writers never drop
    /// each other's entries.
    write_lock:  Mutex<()>,
}

impl IndexStore {
    pub fn new(store: Arc<dyn KvStore>, storage_key: impl Into<String>) -> Self {
        Self {
            store,
            storage_key: storage_key.into(),
            memo: OnceCell::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the memoized index, reading storage on the first call.
    ///
    /// A missing, empty or unparseable blob yields an empty index.
    pub async fn load(&self) -> Result<Index> {
        let memo = self.memo.get_or_try_init(|| self.read_persisted()).await?;
        Ok(memo.read().clone())
    }

    /// Writes `next` to storage as a whole, then makes it the memoized copy.
    pub async fn save(&self, next: Index) -> Result<()> {
        let blob = serde_json::to_string(&next).context(SerializationSnafu)?;
        self.store.set(&self.storage_key, &blob).await?;

        let memo = self
            .memo
            .get_or_init(|| async { RwLock::new(Index::default()) })
            .await;
        *memo.write() = next;
        Ok(())
    }

    /// Adds one entry on top of the latest index and saves the result.
    pub async fn record(&self, key: ContentKey, entry: CacheEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.load().await?;
        next.insert(key, entry);
        self.save(next).await
    }

    /// Drops the given keys and saves the result. Returns how many were
    /// present.
    pub async fn remove_all(&self, keys: &[ContentKey]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.load().await?;
        let removed = keys.iter().filter(|key| next.remove(key).is_some()).count();
        if removed > 0 {
            self.save(next).await?;
        }
        Ok(removed)
    }

    async fn read_persisted(&self) -> Result<RwLock<Index>> {
        let blob = self.store.get(&self.storage_key).await?;
        let index = match blob.as_deref().map(str::trim) {
            None | Some("") => Index::default(),
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|err| {
                warn!(key = %self.storage_key, %err, "cache index is corrupted, starting empty");
                Index::default()
            }),
        };
        debug!(entries = index.len(), "loaded cache index");
        Ok(RwLock::new(index))
    }
}
