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

use std::{path::PathBuf, sync::Arc};

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Outcome of a fetch, shared verbatim by every caller coalesced onto it.
pub type FetchResult = std::result::Result<PathBuf, Arc<CacheError>>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CacheError {
    #[snafu(display("Failed to create cache directory {}", path.display()))]
    Directory {
        path:   PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Network error for URL {url}: {source}"))]
    Network { url: String, source: reqwest::Error },

    #[snafu(display("HTTP error {status} for URL: {url}"))]
    HttpStatus { status: u16, url: String },

    #[snafu(display("File system error at {}: {source}", path.display()))]
    FileSystem {
        path:   PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to encode cache index"))]
    Serialization {
        source: serde_json::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(transparent)]
    Store {
        source: imgcache_store::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to build HTTP client: {source}"))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("Invalid header {name}: {message}"))]
    InvalidHeader { name: String, message: String },

    #[snafu(display("Cannot build a resource locator from base {base}: {message}"))]
    InvalidLocator { base: String, message: String },

    #[snafu(display("Fetch task failed: {message}"))]
    FetchTask { message: String },
}

impl CacheError {
    /// Status code of a rejected response, if that is what this error is.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
