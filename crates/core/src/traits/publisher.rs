use async_trait::async_trait;

use crate::Result;

/// 消息发布抽象接口
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// 发布消息到指定频道
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<()>;
}
