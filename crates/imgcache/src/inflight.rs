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

use std::{collections::HashMap, future::Future, sync::Arc};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::CacheError;

/// Outcome of a coalesced operation, cloned to every waiter.
pub type Outcome<V> = Result<V, Arc<CacheError>>;

/// Handle to an operation that may be awaited by any number of callers.
pub type SharedFetch<V> = Shared<BoxFuture<'static, Outcome<V>>>;

type Pending<V> = Arc<Mutex<HashMap<String, SharedFetch<V>>>>;

/// Coalesces concurrent operations on the same key.
///
/// The first caller for a key spawns the operation as its own task, so it
/// runs to completion even if every waiter goes away. Later callers receive a
/// clone of the same shared future. The key is removed from the registry when
/// the task ends, whether it succeeded, failed or panicked.
pub struct InFlightRegistry<V> {
    pending: Pending<V>,
}

impl<V> Default for InFlightRegistry<V> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<V> InFlightRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Attach to the operation running for `key`, or start one with `start`.
    ///
    /// `start` is only invoked when nothing is in flight for `key`. Must be
    /// called from within a Tokio runtime.
    pub fn run<F, Fut>(&self, key: &str, start: F) -> SharedFetch<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<V>> + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(existing) = pending.get(key) {
            debug!(key, "attaching to in-flight operation");
            return existing.clone();
        }

        let operation = start();
        let guard = RemoveOnDrop {
            pending: Arc::clone(&self.pending),
            key:     key.to_owned(),
        };
        let task = tokio::spawn(async move {
            let _guard = guard;
            operation.await
        });

        let shared = async move {
            task.await.unwrap_or_else(|err| {
                Err(Arc::new(CacheError::FetchTask {
                    message: err.to_string(),
                }))
            })
        }
        .boxed()
        .shared();

        pending.insert(key.to_owned(), shared.clone());
        shared
    }

    /// Whether an operation for `key` is currently running.
    pub fn contains(&self, key: &str) -> bool { self.pending.lock().contains_key(key) }

    pub fn len(&self) -> usize { self.pending.lock().len() }

    pub fn is_empty(&self) -> bool { self.pending.lock().is_empty() }
}

/// Removes the registry entry when the spawned task finishes or unwinds.
struct RemoveOnDrop<V> {
    pending: Pending<V>,
    key:     String,
}

impl<V> Drop for RemoveOnDrop<V> {
    fn drop(&mut self) { self.pending.lock().remove(&self.key); }
}
