use std::sync::Arc;
use tracing::{debug, error};

use notification_cell::publish_logged;
use shared_config::AppConfig;
use shared_models::appointment::Appointment;
use shared_models::auth::Identity;
use shared_models::events::{AppointmentEventPayload, EventName, EventPublisher};

/// Builds appointment domain events and publishes them once the unit of
/// work that produced them has committed.
pub struct AppointmentEventEmitter {
    publisher: Arc<dyn EventPublisher>,
    source: String,
}

impl AppointmentEventEmitter {
    pub fn new(config: &AppConfig, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            publisher,
            source: config.event_source.clone(),
        }
    }

    pub fn event(
        &self,
        event_name: EventName,
        identity: &Identity,
        appointment: &Appointment,
    ) -> AppointmentEventPayload {
        AppointmentEventPayload::new(event_name, &self.source, identity.user_id, appointment)
    }

    /// Returns how many events reached the bus.
    pub async fn publish_all(&self, events: Vec<AppointmentEventPayload>) -> usize {
        let mut published = 0;
        for event in events {
            let topic = event.event_name.as_str();
            match serde_json::to_value(&event) {
                Ok(payload) => {
                    if publish_logged(self.publisher.as_ref(), topic, payload).await {
                        published += 1;
                    }
                }
                Err(e) => error!("Failed to encode {} event: {}", topic, e),
            }
        }
        debug!("Published {} appointment events", published);
        published
    }
}
