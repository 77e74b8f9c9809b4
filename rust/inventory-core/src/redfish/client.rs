/*
 * Copyright 2025 Carver Automation Corporation.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Authenticated HTTP access to a BMC's Redfish service.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;

use crate::error::{Error, Result};
use crate::redfish::schema::SERVICE_ROOT;

/// Fetches Redfish resources by path relative to the service root.
#[async_trait]
pub trait RedfishTransport: Send + Sync {
    /// Human-readable endpoint identity, used in logs and errors.
    fn endpoint(&self) -> &str;

    async fn get(&self, path: &str) -> Result<Vec<u8>>;
}

/// Basic-auth credential pair used for every request to one endpoint.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transport options for [`RedfishClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,

    /// Skip TLS certificate verification. BMCs usually serve self-signed
    /// certificates, so this defaults to `true`.
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            accept_invalid_certs: true,
        }
    }
}

/// reqwest-backed Redfish client.
pub struct RedfishClient {
    base_url: String,
    credentials: Credentials,
    http: Client,
}

impl RedfishClient {
    /// Builds a client for `endpoint`, which may be a bare host (`10.0.0.5`)
    /// or a URL. Bare hosts get `https://`.
    pub fn new(endpoint: &str, credentials: Credentials, options: &ClientOptions) -> Result<Self> {
        let base_url = service_root_url(endpoint)?;

        if options.accept_invalid_certs {
            tracing::warn!(
                endpoint = %base_url,
                "TLS certificate verification disabled for BMC endpoint"
            );
        }

        let http = Client::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .timeout(options.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            credentials,
            http,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RedfishTransport for RedfishClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url_for(path);
        tracing::debug!(url = %url, "GET");

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;
        Ok(body.to_vec())
    }
}

/// Resolves the Redfish service root URL for an endpoint.
fn service_root_url(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() {
        return Err(Error::Config("BMC endpoint is required".to_string()));
    }

    let base = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    };

    if base.ends_with(SERVICE_ROOT) {
        Ok(base)
    } else {
        Ok(format!("{}{}", base, SERVICE_ROOT))
    }
}
