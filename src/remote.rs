//! HTTP transport for outgoing writes.

use async_trait::async_trait;
use clinsync_core::{SyncError, SyncResult, Transport, WriteIntent, WriteOutcome};
use std::time::Duration;
use tracker::{Reference, ReferenceKind, RequestMethod};

/// Where and how one write intent goes onto the wire.
#[derive(Debug, PartialEq, Eq)]
enum Endpoint {
    /// POST; `upsert` adds the platform's idempotent import strategy.
    Post { url: String, upsert: bool },
    /// PUT to the object endpoint.
    Put { url: String },
}

/// Picks the endpoint for an intent.
///
/// Mirrors the platform's dispatch rules: with a known object id (resolved
/// or client-assigned through an id reference) the write goes to the object
/// endpoint, otherwise to the collection. An update without any id cannot
/// be dispatched at all.
fn endpoint_for(base_url: &str, intent: &WriteIntent) -> Result<Endpoint, String> {
    let base = base_url.trim_end_matches('/');
    let collection = format!("{}/{}.json", base, intent.resource_type);
    let object = |id: &str| format!("{}/{}/{}.json", base, intent.resource_type, id);

    let id = intent.resolved_id.clone().or_else(|| {
        (intent.target.kind() == ReferenceKind::Id).then(|| intent.target.value().to_owned())
    });

    match (intent.method, id) {
        (RequestMethod::Update, Some(id)) => Ok(Endpoint::Put { url: object(&id) }),
        (RequestMethod::Update, None) => {
            Err("update dispatched without a resolved object id".into())
        }
        (RequestMethod::CreateOrUpdate, Some(id)) => Ok(Endpoint::Put { url: object(&id) }),
        (RequestMethod::CreateOrUpdate, None) => Ok(Endpoint::Post {
            url: collection,
            upsert: true,
        }),
        (RequestMethod::Create, Some(id)) => Ok(Endpoint::Post {
            url: object(&id),
            upsert: false,
        }),
        (RequestMethod::Create, None) => Ok(Endpoint::Post {
            url: collection,
            upsert: false,
        }),
    }
}

/// Reference of the object the write produced.
///
/// Prefers the import summary in the response body, then falls back to the
/// id the intent was dispatched with, then to the target reference.
fn resulting_reference(intent: &WriteIntent, body: Option<&serde_json::Value>) -> Reference {
    let from_body = body.and_then(|body| {
        body.pointer("/response/importSummaries/0/reference")
            .or_else(|| body.pointer("/response/uid"))
            .and_then(|value| value.as_str())
            .map(|id| Reference::id(id.to_owned()))
    });
    from_body
        .or_else(|| intent.resolved_id.clone().map(Reference::id))
        .unwrap_or_else(|| intent.target.clone())
}

/// [`Transport`] over the platform's JSON web API.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpTransport {
    pub fn new(
        base_url: String,
        username: Option<String>,
        password: Option<String>,
        timeout_secs: u64,
    ) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|err| SyncError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            username,
            password,
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, intent: &WriteIntent) -> SyncResult<WriteOutcome> {
        let endpoint = match endpoint_for(&self.base_url, intent) {
            Ok(endpoint) => endpoint,
            Err(message) => return Ok(WriteOutcome::DefiniteFailure { message }),
        };

        let builder = match &endpoint {
            Endpoint::Post { url, upsert } => {
                let builder = self.client.post(url);
                if *upsert {
                    builder.query(&[("importStrategy", "CREATE_AND_UPDATE")])
                } else {
                    builder
                }
            }
            Endpoint::Put { url } => self.client.put(url),
        };

        let response = match self.authed(builder).json(&intent.body).send().await {
            Ok(response) => response,
            Err(err) if err.is_connect() => {
                // the request never left, so the write was definitely not
                // applied
                return Ok(WriteOutcome::DefiniteFailure {
                    message: format!("connection failed: {}", err),
                });
            }
            Err(err) => {
                // timeout or a failure after the request may have been
                // sent: the remote outcome is unknown
                return Ok(WriteOutcome::AmbiguousFailure {
                    message: err.to_string(),
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            let body = response.json::<serde_json::Value>().await.ok();
            return Ok(WriteOutcome::Success {
                reference: resulting_reference(intent, body.as_ref()),
            });
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Ok(WriteOutcome::DefiniteFailure {
                message: format!("{}: {}", status, body),
            })
        } else {
            // the server failed mid-flight; whether the import ran is
            // unknown
            Ok(WriteOutcome::AmbiguousFailure {
                message: format!("{}: {}", status, body),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn intent(
        method: RequestMethod,
        target: Reference,
        resolved_id: Option<&str>,
    ) -> WriteIntent {
        WriteIntent {
            target,
            resource_type: "trackedEntityInstances".into(),
            resolved_id: resolved_id.map(Into::into),
            method,
            body: json!({}),
        }
    }

    #[test]
    fn update_goes_to_the_object_endpoint() {
        let endpoint = endpoint_for(
            "https://play.example.org/api/",
            &intent(RequestMethod::Update, Reference::code("C1"), Some("a1")),
        )
        .unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Put {
                url: "https://play.example.org/api/trackedEntityInstances/a1.json".into()
            }
        );
    }

    #[test]
    fn update_without_id_is_rejected() {
        assert!(endpoint_for(
            "https://play.example.org/api",
            &intent(RequestMethod::Update, Reference::code("C1"), None),
        )
        .is_err());
    }

    #[test]
    fn create_goes_to_the_collection() {
        let endpoint = endpoint_for(
            "https://play.example.org/api",
            &intent(RequestMethod::Create, Reference::code("C1"), None),
        )
        .unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Post {
                url: "https://play.example.org/api/trackedEntityInstances.json".into(),
                upsert: false,
            }
        );
    }

    #[test]
    fn create_with_client_assigned_id_targets_the_object() {
        let endpoint = endpoint_for(
            "https://play.example.org/api",
            &intent(RequestMethod::Create, Reference::id("newid1"), None),
        )
        .unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Post {
                url: "https://play.example.org/api/trackedEntityInstances/newid1.json".into(),
                upsert: false,
            }
        );
    }

    #[test]
    fn upsert_without_id_uses_the_import_strategy() {
        let endpoint = endpoint_for(
            "https://play.example.org/api",
            &intent(RequestMethod::CreateOrUpdate, Reference::code("C1"), None),
        )
        .unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Post {
                url: "https://play.example.org/api/trackedEntityInstances.json".into(),
                upsert: true,
            }
        );
    }

    #[test]
    fn resulting_reference_prefers_the_import_summary() {
        let write = intent(RequestMethod::Create, Reference::code("C1"), None);
        let body = json!({"response": {"importSummaries": [{"reference": "fresh1"}]}});
        assert_eq!(
            resulting_reference(&write, Some(&body)),
            Reference::id("fresh1")
        );
    }

    #[test]
    fn resulting_reference_falls_back_to_known_ids() {
        let with_id = intent(RequestMethod::Update, Reference::code("C1"), Some("a1"));
        assert_eq!(resulting_reference(&with_id, None), Reference::id("a1"));

        let without = intent(RequestMethod::Create, Reference::code("C1"), None);
        assert_eq!(
            resulting_reference(&without, Some(&json!({}))),
            Reference::code("C1")
        );
    }
}
