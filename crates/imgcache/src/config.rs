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

use std::path::PathBuf;

use bon::Builder;
use jiff::SignedDuration;
use smart_default::SmartDefault;

/// Storage key the serialized index lives under.
pub const DEFAULT_INDEX_KEY: &str = "image_cache_index";

/// Configuration for [`crate::ImageCache`]
#[derive(Debug, Clone, SmartDefault, Builder)]
pub struct ImageCacheConfig {
    /// Directory cached images are published into (default: platform cache
    /// dir / images)
    #[default(imgcache_paths::image_cache_dir().clone())]
    #[builder(default = imgcache_paths::image_cache_dir().clone(), into)]
    pub cache_dir: PathBuf,

    /// Key of the index blob in the key-value store
    #[default(DEFAULT_INDEX_KEY.to_string())]
    #[builder(default = DEFAULT_INDEX_KEY.to_string(), into)]
    pub index_key: String,

    /// Whole-request timeout. `None` leaves the transport default in place.
    pub timeout: Option<SignedDuration>,

    /// Custom User-Agent header
    #[builder(into)]
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_match_default() {
        let built = ImageCacheConfig::builder().build();
        let default = ImageCacheConfig::default();

        assert_eq!(built.cache_dir, default.cache_dir);
        assert_eq!(built.index_key, DEFAULT_INDEX_KEY);
        assert!(built.timeout.is_none());
        assert!(built.user_agent.is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ImageCacheConfig::builder()
            .cache_dir("/tmp/images")
            .index_key("other_index")
            .timeout(SignedDuration::from_secs(5))
            .build();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/images"));
        assert_eq!(config.index_key, "other_index");
        assert_eq!(config.timeout, Some(SignedDuration::from_secs(5)));
    }
}
