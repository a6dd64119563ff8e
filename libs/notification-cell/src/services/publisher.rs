use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use shared_config::AppConfig;
use shared_models::events::{EventPublisher, PublishError};

/// Publishes events on Redis pub/sub channels named `<prefix><topic>`.
pub struct RedisEventPublisher {
    pool: Pool,
    topic_prefix: String,
}

impl RedisEventPublisher {
    pub async fn new(config: &AppConfig) -> Result<Self, PublishError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| PublishError::Transport(format!("Pool creation error: {}", e)))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| PublishError::Transport(format!("Connection error: {}", e)))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        info!("Redis event publisher initialized successfully");

        Ok(Self {
            pool,
            topic_prefix: config.event_topic_prefix.clone(),
        })
    }

    async fn get_connection(&self) -> Result<Connection, PublishError> {
        self.pool
            .get()
            .await
            .map_err(|e| PublishError::Transport(format!("Connection error: {}", e)))
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError> {
        let channel = format!("{}{}", self.topic_prefix, topic);
        let body = serde_json::to_string(&payload)?;
        let mut conn = self.get_connection().await?;

        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        debug!("Published {} to {} subscribers", channel, receivers);
        Ok(())
    }
}

/// Writes events to the log only. Used when no event bus is configured.
#[derive(Default)]
pub struct LoggingEventPublisher;

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError> {
        info!(topic = %topic, payload = %payload, "Domain event");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub topic: String,
    pub payload: Value,
}

/// Keeps published events in memory; topics can be made to fail.
#[derive(Default)]
pub struct InMemoryEventPublisher {
    events: Mutex<Vec<PublishedEvent>>,
    failing_topics: Mutex<HashSet<String>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().await.insert(topic.to_string());
    }

    pub async fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().await.clone()
    }

    pub async fn events_for(&self, topic: &str) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| event.topic == topic)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError> {
        if self.failing_topics.lock().await.contains(topic) {
            return Err(PublishError::Transport(format!("topic {} rejected", topic)));
        }

        self.events.lock().await.push(PublishedEvent {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Publishes `payload`; failures are logged and reported as `false`.
pub async fn publish_logged(publisher: &dyn EventPublisher, topic: &str, payload: Value) -> bool {
    match publisher.publish(topic, payload).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to publish {}: {}", topic, e);
            false
        }
    }
}
