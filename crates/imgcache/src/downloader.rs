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

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use snafu::ResultExt;
use tokio::{
    fs::{self, File},
    io::{AsyncWriteExt, BufWriter},
};
use tracing::{debug, info};

use crate::{
    auth::AuthHeaderProvider,
    config::ImageCacheConfig,
    directory::CacheDir,
    error::{FileSystemSnafu, HttpClientSnafu, HttpStatusSnafu, NetworkSnafu, Result},
    key::ContentKey,
};

/// Extension used when the content type is missing or not a known image type.
pub const FALLBACK_EXTENSION: &str = "jpg";

/// Maps a response's declared content type to the published file extension.
///
/// Parameters such as `; charset=binary` are ignored and matching is
/// case-insensitive.
#[must_use]
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let Some(content_type) = content_type else {
        return FALLBACK_EXTENSION;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => FALLBACK_EXTENSION,
    }
}

/// Streams one remote image into the cache directory and publishes it.
pub struct ImageDownloader {
    client: reqwest::Client,
    auth:   Arc<dyn AuthHeaderProvider>,
}

impl ImageDownloader {
    pub fn new(config: &ImageCacheConfig, auth: Arc<dyn AuthHeaderProvider>) -> Result<Self> {
        Ok(Self {
            client: Self::build_client(config)?,
            auth,
        })
    }

    /// Download `locator` to `<key>.tmp`, then rename it to `<key>.<ext>`.
    ///
    /// Any status of 400 or above aborts the download and removes the
    /// temporary file. Nothing is ever written under the final name until the
    /// body has been fully written and synced.
    pub async fn download(&self, locator: &str, key: &ContentKey, dir: &CacheDir) -> Result<PathBuf> {
        let temp_path = dir.temp_path(key);

        let response = self
            .client
            .get(locator)
            .headers(self.auth.headers())
            .send()
            .await
            .context(NetworkSnafu { url: locator })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            discard(&temp_path).await;
            return HttpStatusSnafu {
                status: status.as_u16(),
                url:    locator,
            }
            .fail();
        }

        let extension = extension_for(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
        );

        let size = match Self::write_body(response, locator, &temp_path).await {
            Ok(size) => size,
            Err(err) => {
                discard(&temp_path).await;
                return Err(err);
            }
        };

        let final_path = dir.final_path(key, extension);
        fs::rename(&temp_path, &final_path)
            .await
            .context(FileSystemSnafu { path: &final_path })?;

        info!(url = locator, path = %final_path.display(), size, "published cached image");
        Ok(final_path)
    }

    async fn write_body(response: reqwest::Response, locator: &str, temp_path: &Path) -> Result<u64> {
        let file = File::create(temp_path)
            .await
            .context(FileSystemSnafu { path: temp_path })?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        let mut stream = response.bytes_stream();
        let mut total_size = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context(NetworkSnafu { url: locator })?;
            writer
                .write_all(&chunk)
                .await
                .context(FileSystemSnafu { path: temp_path })?;
            total_size += chunk.len() as u64;
        }

        writer
            .flush()
            .await
            .context(FileSystemSnafu { path: temp_path })?;
        writer
            .get_mut()
            .sync_all()
            .await
            .context(FileSystemSnafu { path: temp_path })?;

        Ok(total_size)
    }

    fn build_client(config: &ImageCacheConfig) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = config.timeout
            && let Ok(timeout) = std::time::Duration::try_from(timeout)
        {
            builder = builder.timeout(timeout);
        }

        if let Some(ref ua) = config.user_agent {
            builder = builder.user_agent(ua);
        }

        builder.build().context(HttpClientSnafu)
    }
}

/// Best-effort removal of a temporary download.
async fn discard(temp_path: &Path) {
    if fs::remove_file(temp_path).await.is_ok() {
        debug!(path = %temp_path.display(), "discarded temporary download");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        assert_eq!(extension_for(Some("image/png")), "png");
        assert_eq!(extension_for(Some("image/webp")), "webp");
        assert_eq!(extension_for(Some("image/gif")), "gif");
        assert_eq!(extension_for(Some("image/jpeg")), "jpg");
        assert_eq!(extension_for(Some("image/jpg")), "jpg");
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(extension_for(None), "jpg");
        assert_eq!(extension_for(Some("")), "jpg");
        assert_eq!(extension_for(Some("application/octet-stream")), "jpg");
        assert_eq!(extension_for(Some("image/svg+xml")), "jpg");
    }

    #[test]
    fn test_extension_ignores_case_and_parameters() {
        assert_eq!(extension_for(Some("IMAGE/PNG")), "png");
        assert_eq!(extension_for(Some("image/webp; charset=binary")), "webp");
        assert_eq!(extension_for(Some(" image/gif ;q=1")), "gif");
    }
}
