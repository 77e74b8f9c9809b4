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

//! Walks a BMC's systems and their processor/memory collections.
//!
//! Only the systems collection is load-bearing: if it cannot be read the
//! whole run fails. Anything below it that cannot be fetched or decoded is
//! recorded as a [`DecodeWarning`] and skipped.

use crate::cancel::CancelToken;
use crate::error::{DecodeWarning, Error, Result};
use crate::model::{ComponentRecord, DeviceKind, DiscoveryReport};
use crate::redfish::schema::{
    decode_component, strip_service_root, Collection, Component, KindFields,
};
use crate::redfish::RedfishTransport;

const SYSTEMS_PATH: &str = "/Systems";

/// Recovers the component tree of one managed endpoint.
pub struct TopologyWalker<T> {
    transport: T,
}

impl<T: RedfishTransport> TopologyWalker<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Walks the endpoint and returns every decodable component with its
    /// child-to-parent edges.
    ///
    /// Fails with [`Error::Discovery`] if the systems collection is unusable,
    /// [`Error::EmptyResult`] if nothing was found and [`Error::Cancelled`]
    /// if `cancel` fires.
    pub async fn discover(&self, cancel: &CancelToken) -> Result<DiscoveryReport> {
        let endpoint = self.transport.endpoint().to_string();
        tracing::info!(endpoint = %endpoint, "starting Redfish discovery");

        let systems = match self.fetch_collection(SYSTEMS_PATH, cancel).await {
            Ok(collection) => collection,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                return Err(Error::Discovery {
                    cause: format!("systems collection: {err}"),
                })
            }
        };

        let mut report = DiscoveryReport::for_endpoint(endpoint.clone());
        for member in &systems.members {
            let system_uri = member.path().to_string();
            self.walk_system(&system_uri, &mut report, cancel).await?;
        }

        if report.is_empty() {
            return Err(Error::EmptyResult { endpoint });
        }

        tracing::info!(
            endpoint = %endpoint,
            records = report.records.len(),
            warnings = report.warnings.len(),
            "Redfish discovery complete"
        );
        Ok(report)
    }

    async fn walk_system(
        &self,
        system_uri: &str,
        report: &mut DiscoveryReport,
        cancel: &CancelToken,
    ) -> Result<()> {
        let system = match self.fetch_component(system_uri, DeviceKind::Node, cancel).await {
            Ok(component) => component,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                warn(report, system_uri, err);
                return Ok(());
            }
        };

        let (processors, memory) = match &system.fields {
            KindFields::System(fields) => (
                fields.processors.as_ref().map(|l| l.path().to_string()),
                fields.memory.as_ref().map(|l| l.path().to_string()),
            ),
            _ => (None, None),
        };

        match system.into_record(system_uri) {
            Ok(record) => report.records.push(record),
            Err(err) => {
                warn(report, system_uri, err);
                return Ok(());
            }
        }

        let nested = [(processors, DeviceKind::Cpu), (memory, DeviceKind::Dimm)];
        for (collection_uri, kind) in nested {
            let Some(collection_uri) = collection_uri.filter(|uri| !uri.is_empty()) else {
                continue;
            };
            for child in self
                .collect_members(&collection_uri, kind, report, cancel)
                .await?
            {
                report
                    .edges
                    .insert(child.source_uri.clone(), system_uri.to_string());
                report.records.push(child);
            }
        }

        Ok(())
    }

    async fn collect_members(
        &self,
        collection_uri: &str,
        kind: DeviceKind,
        report: &mut DiscoveryReport,
        cancel: &CancelToken,
    ) -> Result<Vec<ComponentRecord>> {
        let collection = match self.fetch_collection(collection_uri, cancel).await {
            Ok(collection) => collection,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                warn(report, collection_uri, err);
                return Ok(Vec::new());
            }
        };

        let mut records = Vec::with_capacity(collection.members.len());
        for member in &collection.members {
            let member_uri = member.path();
            let decoded = self
                .fetch_component(member_uri, kind, cancel)
                .await
                .and_then(|component| component.into_record(member_uri).map_err(Error::from));
            match decoded {
                Ok(record) => records.push(record),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => warn(report, member_uri, err),
            }
        }
        Ok(records)
    }

    async fn fetch_collection(&self, path: &str, cancel: &CancelToken) -> Result<Collection> {
        let body = cancel.run(self.transport.get(path)).await??;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch_component(
        &self,
        path: &str,
        kind: DeviceKind,
        cancel: &CancelToken,
    ) -> Result<Component> {
        let body = cancel.run(self.transport.get(path)).await??;
        Ok(decode_component(kind, &body)?)
    }
}

fn warn(report: &mut DiscoveryReport, locator: &str, err: impl std::fmt::Display) {
    let locator = strip_service_root(locator);
    tracing::warn!(locator = %locator, error = %err, "skipping Redfish resource");
    report.warnings.push(DecodeWarning::new(locator, err));
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves canned bodies keyed by path; unknown paths answer 404.
    struct Fixture {
        bodies: HashMap<String, String>,
    }

    impl Fixture {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                bodies: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl RedfishTransport for Fixture {
        fn endpoint(&self) -> &str {
            "fixture"
        }

        async fn get(&self, path: &str) -> Result<Vec<u8>> {
            self.bodies
                .get(path)
                .map(|b| b.as_bytes().to_vec())
                .ok_or_else(|| Error::HttpStatus {
                    url: path.to_string(),
                    status: 404,
                })
        }
    }

    #[tokio::test]
    async fn test_system_without_nested_collections() {
        let walker = TopologyWalker::new(Fixture::new(&[
            (
                "/Systems",
                r#"{"Members": [{"@odata.id": "/redfish/v1/Systems/1"}]}"#,
            ),
            ("/Systems/1", r#"{"SerialNumber": "SYS1"}"#),
        ]));

        let report = walker.discover(&CancelToken::never()).await.unwrap();
        assert_eq!(report.records.len(), 1);
        assert!(report.edges.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_system_is_skipped() {
        let walker = TopologyWalker::new(Fixture::new(&[
            (
                "/Systems",
                r#"{"Members": [{"@odata.id": "/redfish/v1/Systems/1"}, {"@odata.id": "/redfish/v1/Systems/2"}]}"#,
            ),
            ("/Systems/2", r#"{"SerialNumber": "SYS2"}"#),
        ]));

        let report = walker.discover(&CancelToken::never()).await.unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].source_uri, "/Systems/2");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].locator, "/Systems/1");
    }

    #[tokio::test]
    async fn test_malformed_systems_collection_is_fatal() {
        let walker = TopologyWalker::new(Fixture::new(&[("/Systems", r#"{"Name": "no members"}"#)]));
        let err = walker.discover(&CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, Error::Discovery { .. }));
    }
}
