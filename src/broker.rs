//! Publishes committed domain events to NATS when a server is configured.

use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventBroker {
    nats: Option<async_nats::Client>,
}

impl EventBroker {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    pub fn disabled() -> Self { Self::default() }

    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::disabled() };
        match async_nats::connect(url).await {
            Ok(client) => Self::new(Some(client)),
            Err(e) => {
                warn!(error = %e, "NATS unavailable, events will not be published");
                Self::disabled()
            }
        }
    }

    /// Best effort: a failed publish is logged, never surfaced.
    pub async fn publish(&self, events: &[DomainEvent]) {
        for event in events {
            debug!(subject = event.subject(), ?event, "domain event");
            let Some(client) = &self.nats else { continue };
            let payload = match serde_json::to_vec(event) {
                Ok(p) => p,
                Err(e) => { warn!(error = %e, "failed to encode event"); continue; }
            };
            if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
                warn!(subject = event.subject(), error = %e, "failed to publish event");
            }
        }
    }
}
