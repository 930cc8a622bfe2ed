use std::sync::Arc;
use tracing::{debug, info};

use jobrunner_core::{
    config::{DatabaseConfig, MessageQueueConfig, MessageQueueType, NotificationConfig},
    traits::{MessagePublisher, Notifier, Store},
    SchedulerResult,
};

use crate::{
    database::{InMemoryStore, PostgresStore},
    message_queue::{InMemoryPublisher, RedisPublisher},
    notification::{LogNotifier, WebhookNotifier},
};

/// 按配置创建存储、消息发布器和通知器
pub struct InfrastructureFactory;

impl InfrastructureFactory {
    pub async fn create_store(config: &DatabaseConfig) -> SchedulerResult<Arc<dyn Store>> {
        if config.is_in_memory() {
            info!("使用内存存储");
            return Ok(Arc::new(InMemoryStore::new()));
        }

        info!("连接PostgreSQL存储");
        Ok(Arc::new(PostgresStore::connect(config).await?))
    }

    pub async fn create_publisher(
        config: &MessageQueueConfig,
    ) -> SchedulerResult<Arc<dyn MessagePublisher>> {
        debug!("Creating message publisher with type: {:?}", config.r#type);

        match config.r#type {
            MessageQueueType::Redis => {
                info!("Initializing Redis publisher");
                Ok(Arc::new(RedisPublisher::connect(config).await?))
            }
            MessageQueueType::InMemory => {
                info!("Initializing in-memory publisher");
                Ok(Arc::new(InMemoryPublisher::new()))
            }
        }
    }

    pub fn create_notifier(config: &NotificationConfig) -> SchedulerResult<Arc<dyn Notifier>> {
        match &config.webhook_url {
            Some(url) => {
                info!("通知将通过webhook发送: {}", url);
                Ok(Arc::new(WebhookNotifier::new(url, config)?))
            }
            None => Ok(Arc::new(LogNotifier::new(config.resolved_hostname()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_components() {
        let config = DatabaseConfig {
            url: "memory://".to_string(),
            ..DatabaseConfig::default()
        };
        let store = InfrastructureFactory::create_store(&config).await.unwrap();
        let tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();

        let mq_config = MessageQueueConfig {
            r#type: MessageQueueType::InMemory,
            ..MessageQueueConfig::default()
        };
        let publisher = InfrastructureFactory::create_publisher(&mq_config)
            .await
            .unwrap();
        publisher.publish("worker.event", b"{}").await.unwrap();
    }

    #[test]
    fn test_notifier_selection() {
        let config = NotificationConfig::default();
        assert!(InfrastructureFactory::create_notifier(&config).is_ok());

        let config = NotificationConfig {
            webhook_url: Some("http://localhost:9000/notify".to_string()),
            ..NotificationConfig::default()
        };
        assert!(InfrastructureFactory::create_notifier(&config).is_ok());
    }
}
