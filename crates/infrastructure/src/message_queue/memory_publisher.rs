use async_trait::async_trait;
use jobrunner_core::{
    models::{DispatchMessage, OutboundMessage, RunEvent},
    traits::MessagePublisher,
    SchedulerResult,
};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const SUBSCRIBER_CAPACITY: usize = 1024;

/// 内存消息发布器
///
/// 记录所有已发布的消息，同时转发给订阅者。用于嵌入式运行和测试。
#[derive(Clone)]
pub struct InMemoryPublisher {
    published: Arc<RwLock<Vec<OutboundMessage>>>,
    sender: broadcast::Sender<OutboundMessage>,
}

impl Default for InMemoryPublisher {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
            sender,
        }
    }
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.sender.subscribe()
    }

    pub async fn published(&self) -> Vec<OutboundMessage> {
        self.published.read().await.clone()
    }

    /// 指定频道上已发布的分发消息
    pub async fn dispatch_messages(&self, channel: &str) -> Vec<DispatchMessage> {
        self.published
            .read()
            .await
            .iter()
            .filter(|message| message.channel == channel)
            .filter_map(|message| serde_json::from_slice(&message.payload).ok())
            .collect()
    }

    /// 指定频道上已发布的运行实例事件
    pub async fn run_events(&self, channel: &str) -> Vec<RunEvent> {
        self.published
            .read()
            .await
            .iter()
            .filter(|message| message.channel == channel)
            .filter_map(|message| serde_json::from_slice(&message.payload).ok())
            .collect()
    }

    pub async fn clear(&self) {
        self.published.write().await.clear();
    }
}

#[async_trait]
impl MessagePublisher for InMemoryPublisher {
    async fn publish(&self, channel: &str, payload: &[u8]) -> SchedulerResult<()> {
        let message = OutboundMessage {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        };

        self.published.write().await.push(message.clone());
        // 没有订阅者时发送失败，忽略即可
        let _ = self.sender.send(message);

        debug!(channel = channel, "消息已发布到内存队列");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_records_and_forwards() {
        let publisher = InMemoryPublisher::new();
        let mut receiver = publisher.subscribe();

        let payload = DispatchMessage::enqueue(5).to_bytes().unwrap();
        publisher
            .publish("master.broadcast.key-1", &payload)
            .await
            .unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.channel, "master.broadcast.key-1");

        let messages = publisher.dispatch_messages("master.broadcast.key-1").await;
        assert_eq!(messages, vec![DispatchMessage::enqueue(5)]);
        assert!(publisher
            .dispatch_messages("master.broadcast.key-2")
            .await
            .is_empty());

        publisher.clear().await;
        assert!(publisher.published().await.is_empty());
    }
}
