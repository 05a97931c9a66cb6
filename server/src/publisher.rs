use exporter::clients::pubsub::PubSubClient;
use exporter::destination::Publisher;
use exporter::error::{ErrorKind, ExportResult};
use exporter::export_error;

/// Publisher used by the service.
///
/// The Pub/Sub client is only connected when at least one rule names a topic. Without it,
/// a publish can only be reached through a misconfiguration and fails as such.
#[derive(Debug, Clone)]
pub enum RowPublisher {
    PubSub(PubSubClient),
    Disabled,
}

impl Publisher for RowPublisher {
    fn name() -> &'static str {
        "pubsub"
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> ExportResult<()> {
        match self {
            RowPublisher::PubSub(client) => client.publish(topic, payload).await,
            RowPublisher::Disabled => Err(export_error!(
                ErrorKind::ConfigError,
                "Pub/Sub publishing is not configured",
                topic
            )),
        }
    }
}
