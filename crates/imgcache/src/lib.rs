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

//! Local, content-addressed cache for remotely hosted images.
//!
//! A remote locator is hashed into a [`ContentKey`], downloaded once into
//! `<cache_dir>/<key>.<ext>` and recorded in an index persisted through a
//! [`KvStore`]. Typical use:
//!
//! 1. [`ImageCache::local_path_if_cached`] as the fast path,
//! 2. [`ImageCache::ensure_cached`] on a miss,
//! 3. [`ImageCache::warm_all`] to pre-populate a handful of images before
//!    they are displayed.

mod auth;
mod cache;
mod config;
mod directory;
mod downloader;
mod error;
mod index;
mod inflight;
mod key;
mod locator;
mod warm;

pub use auth::{AuthHeaderProvider, NoAuth, StaticHeaders};
pub use cache::ImageCache;
pub use config::{DEFAULT_INDEX_KEY, ImageCacheConfig};
pub use directory::CacheDir;
pub use downloader::{FALLBACK_EXTENSION, extension_for};
pub use error::{CacheError, FetchResult, Result};
pub use imgcache_store::{KvStore, MemoryKvStore};
pub use index::{CacheEntry, Index, IndexStore};
pub use inflight::{InFlightRegistry, Outcome, SharedFetch};
pub use key::ContentKey;
pub use locator::resource_locator;
pub use warm::WarmOutcome;
