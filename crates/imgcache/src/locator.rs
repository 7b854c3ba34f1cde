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

use reqwest::Url;

use crate::error::{CacheError, Result};

/// Joins a bare file name onto a base URL as one percent-encoded path
/// segment.
///
/// `resource_locator("https://cdn.example.com/images", "summer sale.png")`
/// yields `https://cdn.example.com/images/summer%20sale.png`.
pub fn resource_locator(base: &str, file_name: &str) -> Result<String> {
    let invalid = |message: String| CacheError::InvalidLocator {
        base: base.to_string(),
        message,
    };

    let mut url = Url::parse(base).map_err(|err| invalid(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("base URL cannot carry a path".to_string()))?
        .pop_if_empty()
        .push(file_name);

    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_optional() {
        let expected = "https://cdn.example.com/images/summer%20sale.png";
        assert_eq!(
            resource_locator("https://cdn.example.com/images", "summer sale.png").unwrap(),
            expected
        );
        assert_eq!(
            resource_locator("https://cdn.example.com/images/", "summer sale.png").unwrap(),
            expected
        );
    }

    #[test]
    fn test_file_name_is_a_single_segment() {
        assert_eq!(
            resource_locator("https://cdn.example.com", "a/b?.png").unwrap(),
            "https://cdn.example.com/a%2Fb%3F.png"
        );
    }

    #[test]
    fn test_rejects_unusable_base() {
        assert!(matches!(
            resource_locator("not a url", "a.png"),
            Err(CacheError::InvalidLocator { .. })
        ));
        assert!(matches!(
            resource_locator("mailto:someone@example.com", "a.png"),
            Err(CacheError::InvalidLocator { .. })
        ));
    }
}
