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

//! Redfish topology discovery.

mod client;
pub mod schema;
mod walker;

pub use client::{ClientOptions, Credentials, RedfishClient, RedfishTransport};
pub use walker::TopologyWalker;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::model::DiscoveryReport;

/// Discovers the components behind one BMC endpoint.
pub async fn discover(
    endpoint: &str,
    credentials: Credentials,
    options: &ClientOptions,
    cancel: &CancelToken,
) -> Result<DiscoveryReport> {
    let client = RedfishClient::new(endpoint, credentials, options)?;
    TopologyWalker::new(client).discover(cancel).await
}
