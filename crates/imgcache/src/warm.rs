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

use futures::future::join_all;
use tracing::{info, warn};

use crate::{
    cache::ImageCache,
    error::{CacheError, FetchResult},
};

/// Settled result of warming one locator.
#[derive(Debug, Clone)]
pub struct WarmOutcome {
    pub locator: String,
    pub result:  FetchResult,
}

impl WarmOutcome {
    #[must_use]
    pub const fn is_ok(&self) -> bool { self.result.is_ok() }

    #[must_use]
    pub fn path(&self) -> Option<&Path> { self.result.as_ref().ok().map(PathBuf::as_path) }

    #[must_use]
    pub fn error(&self) -> Option<&CacheError> { self.result.as_ref().err().map(Arc::as_ref) }
}

impl ImageCache {
    /// Fetch every non-empty locator concurrently and report each outcome.
    ///
    /// One locator failing never affects the others, and failures are only
    /// reported through the returned outcomes. Outcomes follow input order.
    pub async fn warm_all<I, S>(&self, locators: I) -> Vec<WarmOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let locators: Vec<String> = locators
            .into_iter()
            .map(Into::into)
            .filter(|locator| !locator.is_empty())
            .collect();

        let outcomes = join_all(locators.into_iter().map(|locator| async move {
            let result = self.ensure_cached(&locator).await;
            if let Err(ref err) = result {
                warn!(url = %locator, %err, "failed to warm image");
            }
            WarmOutcome { locator, result }
        }))
        .await;

        let cached = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        info!(cached, total = outcomes.len(), "warmed image cache");
        outcomes
    }
}
