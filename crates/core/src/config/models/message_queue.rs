use serde::{Deserialize, Serialize};

/// Message queue type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageQueueType {
    #[default]
    Redis,
    InMemory,
}

/// 分发消息的发布配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessageQueueConfig {
    pub r#type: MessageQueueType,
    pub url: String,
    /// Worker频道前缀，完整频道名为 `<prefix>.<api_key>`
    pub channel_prefix: String,
    /// 运行实例事件频道
    pub event_channel: String,
    pub connection_timeout_seconds: u64,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            r#type: MessageQueueType::Redis,
            url: "redis://localhost:6379".to_string(),
            channel_prefix: "master.broadcast".to_string(),
            event_channel: "worker.event".to_string(),
            connection_timeout_seconds: 30,
        }
    }
}

impl MessageQueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.r#type == MessageQueueType::Redis {
            if self.url.is_empty() {
                return Err(anyhow::anyhow!("消息队列URL不能为空"));
            }
            if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
                return Err(anyhow::anyhow!("Redis URL必须以redis://或rediss://开头"));
            }
        }

        if self.channel_prefix.is_empty() {
            return Err(anyhow::anyhow!("广播频道前缀不能为空"));
        }

        if self.event_channel.is_empty() {
            return Err(anyhow::anyhow!("事件频道不能为空"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("消息队列连接超时时间必须大于0"));
        }

        Ok(())
    }
}
