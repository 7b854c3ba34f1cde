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

use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tokio::fs;

use crate::{
    error::{DirectorySnafu, Result},
    key::ContentKey,
};

/// The on-disk cache root and the file names derived inside it.
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub const fn new(root: PathBuf) -> Self { Self { root } }

    pub fn root(&self) -> &Path { &self.root }

    /// Create the cache root and any missing parents. Succeeds when the
    /// directory already exists, including when another task created it
    /// concurrently.
    pub async fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .context(DirectorySnafu { path: &self.root })
    }

    /// Path a download is streamed into before being published.
    pub fn temp_path(&self, key: &ContentKey) -> PathBuf {
        self.root.join(format!("{key}.tmp"))
    }

    /// Path a download is published under.
    pub fn final_path(&self, key: &ContentKey, extension: &str) -> PathBuf {
        self.root.join(format!("{key}.{extension}"))
    }
}
