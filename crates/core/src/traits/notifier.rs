use async_trait::async_trait;

use crate::{models::Notification, Result};

/// 通知发送接口
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}
