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
    path::{Path, PathBuf},
    sync::Arc,
};

use imgcache_store::KvStore;
use tracing::{debug, instrument};

use crate::{
    auth::AuthHeaderProvider,
    config::ImageCacheConfig,
    directory::CacheDir,
    downloader::ImageDownloader,
    error::{FetchResult, Result},
    index::{CacheEntry, IndexStore},
    inflight::InFlightRegistry,
    key::ContentKey,
};

/// Content-addressed cache of remote images on local disk.
///
/// Cheap to clone; clones share the memoized index and the in-flight
/// registry. Construct one per process and hand clones to callers.
///
/// Components:
/// - `CacheDir`: the cache root and derived file names
/// - `IndexStore`: persisted key → entry mapping
/// - `InFlightRegistry`: coalesces concurrent fetches of one locator
/// - `ImageDownloader`: streams and publishes a single image
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<ImageCacheInner>,
}

struct ImageCacheInner {
    dir:        CacheDir,
    index:      IndexStore,
    in_flight:  InFlightRegistry<PathBuf>,
    downloader: ImageDownloader,
}

impl ImageCache {
    /// Create a cache over `store`, sending `auth` headers with every download.
    pub fn new(
        config: ImageCacheConfig,
        store: Arc<dyn KvStore>,
        auth: Arc<dyn AuthHeaderProvider>,
    ) -> Result<Self> {
        let downloader = ImageDownloader::new(&config, auth)?;
        Ok(Self {
            inner: Arc::new(ImageCacheInner {
                dir: CacheDir::new(config.cache_dir),
                index: IndexStore::new(store, config.index_key),
                in_flight: InFlightRegistry::new(),
                downloader,
            }),
        })
    }

    /// Directory cached images are published into.
    pub fn cache_dir(&self) -> &Path { self.inner.dir.root() }

    /// Local file for `locator` if it is cached and still on disk.
    ///
    /// Never touches the network or the index. An entry whose file was
    /// deleted externally is reported as a miss and left in place.
    #[instrument(skip(self), err(Display))]
    pub async fn local_path_if_cached(&self, locator: &str) -> Result<Option<PathBuf>> {
        let key = ContentKey::derive(locator);
        self.inner.dir.ensure().await?;
        self.inner.lookup_valid(&key).await
    }

    /// Local file for `locator`, downloading it if necessary.
    ///
    /// Concurrent calls for the same locator share one download and receive
    /// the same outcome, error included. Nothing is retried.
    #[instrument(skip(self), err(level = "debug", Display))]
    pub async fn ensure_cached(&self, locator: &str) -> FetchResult {
        self.inner.dir.ensure().await.map_err(Arc::new)?;

        let inner = Arc::clone(&self.inner);
        let owned = locator.to_owned();
        self.inner
            .in_flight
            .run(locator, move || async move { inner.fill(&owned).await.map_err(Arc::new) })
            .await
    }

    /// Whether a fetch for `locator` is currently running.
    pub fn is_fetching(&self, locator: &str) -> bool { self.inner.in_flight.contains(locator) }

    /// Snapshot of every index entry, dangling ones included.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let index = self.inner.index.load().await?;
        Ok(index.values().cloned().collect())
    }

    /// Drop index entries whose file no longer exists. Returns how many were
    /// removed.
    #[instrument(skip(self), err(Display))]
    pub async fn prune_dangling(&self) -> Result<usize> {
        let index = self.inner.index.load().await?;
        let mut dangling = Vec::new();
        for (key, entry) in index.iter() {
            if !file_exists(&entry.local_path).await {
                dangling.push(key.clone());
            }
        }

        if dangling.is_empty() {
            return Ok(0);
        }
        let removed = self.inner.index.remove_all(&dangling).await?;
        debug!(removed, "pruned dangling cache entries");
        Ok(removed)
    }
}

impl ImageCacheInner {
    /// Path of a valid entry for `key`: indexed and present on disk.
    async fn lookup_valid(&self, key: &ContentKey) -> Result<Option<PathBuf>> {
        let index = self.index.load().await?;
        let Some(entry) = index.get(key) else {
            return Ok(None);
        };

        if file_exists(&entry.local_path).await {
            Ok(Some(entry.local_path.clone()))
        } else {
            debug!(%key, path = %entry.local_path.display(), "indexed file is missing");
            Ok(None)
        }
    }

    /// Body of a fetch, run once per coalesced group.
    async fn fill(&self, locator: &str) -> Result<PathBuf> {
        let key = ContentKey::derive(locator);

        // A fetch that finished just before this one started may have
        // populated the entry already.
        if let Some(path) = self.lookup_valid(&key).await? {
            debug!(%key, "cache hit");
            return Ok(path);
        }

        let path = self.downloader.download(locator, &key, &self.dir).await?;
        self.index
            .record(key, CacheEntry::new(locator, path.clone()))
            .await?;
        Ok(path)
    }
}

async fn file_exists(path: &Path) -> bool { tokio::fs::try_exists(path).await.unwrap_or(false) }
