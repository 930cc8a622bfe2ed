use async_trait::async_trait;
use jobrunner_core::{
    config::MessageQueueConfig, traits::MessagePublisher, SchedulerError, SchedulerResult,
};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

/// 基于Redis PUBLISH的消息发布器
#[derive(Clone)]
pub struct RedisPublisher {
    connection: ConnectionManager,
}

impl RedisPublisher {
    pub async fn connect(config: &MessageQueueConfig) -> SchedulerResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            SchedulerError::MessageQueue(format!("Failed to create Redis client: {e}"))
        })?;

        let connection = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout_seconds),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| SchedulerError::MessageQueue("连接Redis超时".to_string()))?
        .map_err(|e| SchedulerError::MessageQueue(format!("连接Redis失败: {e}")))?;

        info!("成功连接到Redis: {}", config.url);
        Ok(Self { connection })
    }
}

#[async_trait]
impl MessagePublisher for RedisPublisher {
    async fn publish(&self, channel: &str, payload: &[u8]) -> SchedulerResult<()> {
        let mut connection = self.connection.clone();
        let receivers: i64 = connection
            .publish(channel, payload)
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("Redis PUBLISH失败: {e}")))?;

        debug!(channel = channel, receivers = receivers, "消息已发布");
        Ok(())
    }
}
