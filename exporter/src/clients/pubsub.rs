//! Google Pub/Sub publisher for the durable row hand-off.
//!
//! Authentication uses Application Default Credentials. Set `PUBSUB_EMULATOR_HOST` to publish to
//! a local emulator instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use gcloud_googleapis::pubsub::v1::PubsubMessage;
use gcloud_pubsub::client::{Client, ClientConfig};
use gcloud_pubsub::publisher::Publisher as TopicPublisher;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::destination::Publisher;
use crate::error::{ErrorKind, ExportResult};
use crate::export_error;

/// Publishes rows to Pub/Sub topics, keeping one publisher per topic.
#[derive(Clone)]
pub struct PubSubClient {
    client: Client,
    publishers: Arc<RwLock<HashMap<String, TopicPublisher>>>,
}

impl PubSubClient {
    pub async fn new() -> ExportResult<Self> {
        let config = ClientConfig::default().with_auth().await.map_err(|err| {
            export_error!(
                ErrorKind::ConfigError,
                "Failed to configure Pub/Sub authentication",
                err
            )
        })?;
        let client = Client::new(config).await.map_err(|err| {
            export_error!(ErrorKind::ConfigError, "Failed to create Pub/Sub client", err)
        })?;

        info!("connected to google pub/sub");

        Ok(Self {
            client,
            publishers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    async fn publisher(&self, topic: &str) -> TopicPublisher {
        {
            let publishers = self.publishers.read().await;
            if let Some(publisher) = publishers.get(topic) {
                return publisher.clone();
            }
        }

        let mut publishers = self.publishers.write().await;
        publishers
            .entry(topic.to_owned())
            .or_insert_with(|| {
                debug!(topic, "creating pub/sub publisher");
                self.client.topic(topic).new_publisher(None)
            })
            .clone()
    }
}

impl Publisher for PubSubClient {
    fn name() -> &'static str {
        "pubsub"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> ExportResult<()> {
        let publisher = self.publisher(topic).await;

        let message = PubsubMessage {
            data: payload.into(),
            ..Default::default()
        };

        let awaiter = publisher.publish(message).await;
        let message_id = awaiter.get().await.map_err(|err| {
            export_error!(
                ErrorKind::DispatchFailed,
                "Failed to publish row to Pub/Sub",
                format!("topic `{topic}`: {err}")
            )
        })?;

        debug!(topic, %message_id, "published row to pub/sub");

        Ok(())
    }
}

impl fmt::Debug for PubSubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSubClient").finish_non_exhaustive()
    }
}
