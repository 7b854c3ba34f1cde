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

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::error::{CacheError, Result};

/// Supplies the headers attached to every image request.
///
/// The cache treats the returned map as opaque and sends it verbatim. It is
/// queried once per download so implementations may rotate credentials.
pub trait AuthHeaderProvider: Send + Sync {
    fn headers(&self) -> HeaderMap;
}

impl<F> AuthHeaderProvider for F
where
    F: Fn() -> HeaderMap + Send + Sync,
{
    fn headers(&self) -> HeaderMap { self() }
}

/// Sends no extra headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthHeaderProvider for NoAuth {
    fn headers(&self) -> HeaderMap { HeaderMap::new() }
}

/// A fixed set of headers, typically copied from an API client's defaults.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    headers: HeaderMap,
}

impl StaticHeaders {
    #[must_use]
    pub const fn new(headers: HeaderMap) -> Self { Self { headers } }

    /// `Authorization: Bearer <token>`, marked sensitive.
    pub fn bearer(token: &str) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| invalid_header(AUTHORIZATION.as_str(), &err))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(Self { headers })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            let name = name.as_ref();
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|err| invalid_header(name, &err))?;
            let header_value =
                HeaderValue::from_str(value.as_ref()).map_err(|err| invalid_header(name, &err))?;
            headers.insert(header_name, header_value);
        }
        Ok(Self { headers })
    }
}

impl AuthHeaderProvider for StaticHeaders {
    fn headers(&self) -> HeaderMap { self.headers.clone() }
}

fn invalid_header(name: &str, err: &dyn std::fmt::Display) -> CacheError {
    CacheError::InvalidHeader {
        name:    name.to_string(),
        message: err.to_string(),
    }
}
