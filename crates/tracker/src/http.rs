//! HTTP implementation of the remote metadata service.

use crate::metadata::{MetadataFilter, MetadataPage, MetadataRecord};
use crate::reference::{Reference, ReferenceKind};
use crate::remote::{MetadataSource, RemoteError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Fields requested on every metadata read.
const FIELDS: &str = "id,code,identifier,name,lastUpdated,attributes";

fn default_timeout_secs() -> u64 {
    30
}

/// Connection parameters for the remote platform's web API.
#[derive(Clone, Debug, Deserialize)]
pub struct RemoteConfig {
    /// API base URL, e.g. `https://play.example.org/api`.
    pub base_url: String,
    /// Metadata collection to read, e.g. `trackedEntityTypes`.
    pub resource_type: String,
    /// Basic-auth username, when the API is not open.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// List envelope the platform wraps collection responses in.
#[derive(Debug, Deserialize)]
struct ItemsEnvelope {
    #[serde(default)]
    items: Vec<MetadataRecord>,
    #[serde(default)]
    pager: Option<Pager>,
}

#[derive(Debug, Deserialize)]
struct Pager {
    #[serde(rename = "nextPage")]
    next_page: Option<String>,
}

/// Slim envelope for the change feed, where only ids are requested.
#[derive(Debug, Deserialize)]
struct ChangedItemsEnvelope {
    #[serde(default)]
    items: Vec<ChangedItem>,
}

#[derive(Debug, Deserialize)]
struct ChangedItem {
    id: String,
}

/// [`MetadataSource`] over the platform's JSON web API.
pub struct HttpMetadataSource {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl HttpMetadataSource {
    /// Build a source from connection parameters.
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Ok(Self { client, config })
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/{}.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.resource_type
        )
    }

    fn object_url(&self, id: &str) -> String {
        format!(
            "{}/{}/{}.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.resource_type,
            id
        )
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(url);
        if let Some(username) = &self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_deref());
        }
        builder
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = builder
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(RemoteError::Rejected(format!("{}: {}", status, body)))
        } else {
            Err(RemoteError::Transport(format!("{}: {}", status, body)))
        }
    }

    async fn first_by_filter(&self, filter: &str) -> Result<Option<MetadataRecord>, RemoteError> {
        let response = self
            .send(self.get(self.collection_url()).query(&[
                ("paging", "false"),
                ("fields", FIELDS),
                ("filter", filter),
            ]))
            .await?;
        let envelope: ItemsEnvelope = response
            .json()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))?;
        Ok(envelope.items.into_iter().next())
    }
}

/// Splits a flat offset into the platform's page-based paging.
///
/// Returns `(page, page_size, skip)` where `skip` items of the fetched
/// page precede the requested offset.
fn page_query(offset: u32, limit: u32) -> (u32, u32, u32) {
    let limit = limit.max(1);
    (offset / limit + 1, limit, offset % limit)
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch_by_reference(
        &self,
        reference: &Reference,
    ) -> Result<Option<MetadataRecord>, RemoteError> {
        match reference.kind() {
            ReferenceKind::Id => {
                let builder = self
                    .get(self.object_url(reference.value()))
                    .query(&[("fields", FIELDS)]);
                let response = builder
                    .send()
                    .await
                    .map_err(|err| RemoteError::Transport(err.to_string()))?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return if status.is_client_error() {
                        Err(RemoteError::Rejected(format!("{}: {}", status, body)))
                    } else {
                        Err(RemoteError::Transport(format!("{}: {}", status, body)))
                    };
                }
                let record: MetadataRecord = response
                    .json()
                    .await
                    .map_err(|err| RemoteError::Decode(err.to_string()))?;
                Ok(Some(record))
            }
            ReferenceKind::Code => {
                self.first_by_filter(&format!("code:eq:{}", reference.value()))
                    .await
            }
            ReferenceKind::Identifier => {
                self.first_by_filter(&format!("identifier:eq:{}", reference.value()))
                    .await
            }
        }
    }

    async fn fetch_page(
        &self,
        filter: &MetadataFilter,
        offset: u32,
        limit: u32,
    ) -> Result<MetadataPage, RemoteError> {
        let (page, page_size, skip) = page_query(offset, limit);
        let mut builder = self.get(self.collection_url()).query(&[
            ("paging", "true".to_owned()),
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
            ("order", "id".to_owned()),
            ("fields", FIELDS.to_owned()),
        ]);
        for filter_param in filter.to_query() {
            builder = builder.query(&[("filter", filter_param)]);
        }

        let response = self.send(builder).await?;
        let envelope: ItemsEnvelope = response
            .json()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))?;

        let more = envelope
            .pager
            .as_ref()
            .is_some_and(|pager| pager.next_page.is_some());
        let items: Vec<MetadataRecord> =
            envelope.items.into_iter().skip(skip as usize).collect();
        Ok(MetadataPage { items, more })
    }

    async fn fetch_changed_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Reference>, RemoteError> {
        let response = self
            .send(self.get(self.collection_url()).query(&[
                ("paging", "false".to_owned()),
                ("fields", "id".to_owned()),
                (
                    "filter",
                    format!("lastUpdated:ge:{}", since.format("%Y-%m-%dT%H:%M:%S%.3f")),
                ),
            ]))
            .await?;
        let envelope: ChangedItemsEnvelope = response
            .json()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))?;
        Ok(envelope
            .items
            .into_iter()
            .map(|item| Reference::id(item.id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_splits_offsets() {
        assert_eq!(page_query(0, 10), (1, 10, 0));
        assert_eq!(page_query(20, 10), (3, 10, 0));
        assert_eq!(page_query(25, 10), (3, 10, 5));
        // zero limit is clamped instead of dividing by zero
        assert_eq!(page_query(7, 0), (8, 1, 0));
    }

    #[test]
    fn envelope_parses_platform_payload() {
        let envelope: ItemsEnvelope = serde_json::from_str(
            r#"{
                "pager": {"page": 1, "pageCount": 2, "nextPage": "/api/x.json?page=2"},
                "items": [
                    {"id": "a1", "code": "C1", "name": "One", "lastUpdated": "2026-02-01T08:00:00.000Z"},
                    {"id": "a2", "name": "Two", "lastUpdated": "2026-02-02T08:00:00.000Z",
                     "attributes": {"valueUnits": {"birthWeight": "g"}}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(envelope.items.len(), 2);
        assert_eq!(envelope.items[0].code.as_deref(), Some("C1"));
        assert!(envelope.pager.unwrap().next_page.is_some());
        assert_eq!(
            crate::metadata::expected_unit(&envelope.items[1], "birthWeight"),
            Some(units::Unit::Gram)
        );
    }

    #[test]
    fn empty_envelope_defaults() {
        let envelope: ItemsEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.items.is_empty());
        assert!(envelope.pager.is_none());

        let changed: ChangedItemsEnvelope =
            serde_json::from_str(r#"{"items": [{"id": "x"}]}"#).unwrap();
        assert_eq!(changed.items[0].id, "x");
    }

    #[test]
    fn urls_are_built_from_the_base() {
        let source = HttpMetadataSource::new(RemoteConfig {
            base_url: "https://play.example.org/api/".into(),
            resource_type: "organisationUnits".into(),
            username: None,
            password: None,
            timeout_secs: 5,
        })
        .unwrap();

        assert_eq!(
            source.collection_url(),
            "https://play.example.org/api/organisationUnits.json"
        );
        assert_eq!(
            source.object_url("a1"),
            "https://play.example.org/api/organisationUnits/a1.json"
        );
    }
}
