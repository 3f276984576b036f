//! Producer for a Kafka REST proxy (v3 records API).
//!
//! Each message is one `POST {base}/v3/clusters/{cluster}/topics/{topic}/records`
//! with a string key, the JSON record as a string value, and base64-encoded
//! header values. A 2xx response means the proxy accepted the record.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

use super::{MessageProducer, OutboundMessage, ProduceError};

#[derive(Debug, Serialize)]
struct ProduceRecord<'a> {
    key: TypedData<'a>,
    value: TypedData<'a>,
    headers: Vec<RecordHeader<'a>>,
}

#[derive(Debug, Serialize)]
struct TypedData<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
struct RecordHeader<'a> {
    name: &'a str,
    value: String,
}

impl<'a> ProduceRecord<'a> {
    fn from_message(message: &'a OutboundMessage) -> Self {
        Self {
            key: TypedData {
                kind: "STRING",
                data: &message.key,
            },
            value: TypedData {
                kind: "STRING",
                data: &message.payload,
            },
            headers: message
                .headers
                .iter()
                .map(|(name, value)| RecordHeader {
                    name,
                    value: STANDARD.encode(value),
                })
                .collect(),
        }
    }
}

/// Produces records through a Kafka REST proxy.
#[derive(Debug, Clone)]
pub struct RestProxyProducer {
    client: reqwest::Client,
    base_url: String,
    cluster_id: String,
}

impl RestProxyProducer {
    /// Per-attempt request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a producer for the proxy at `base_url` and the given cluster.
    ///
    /// # Errors
    ///
    /// Returns `ProduceError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: &str, cluster_id: impl Into<String>) -> Result<Self, ProduceError> {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProduceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            cluster_id: cluster_id.into(),
        })
    }

    fn endpoint(&self, topic: &str) -> String {
        format!(
            "{}/v3/clusters/{}/topics/{topic}/records",
            self.base_url, self.cluster_id
        )
    }
}

#[async_trait]
impl MessageProducer for RestProxyProducer {
    async fn produce(&self, message: &OutboundMessage) -> Result<(), ProduceError> {
        let response = self
            .client
            .post(self.endpoint(&message.topic))
            .json(&ProduceRecord::from_message(message))
            .send()
            .await
            .map_err(|e| ProduceError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProduceError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
