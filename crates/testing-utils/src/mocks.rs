use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use jobrunner_core::{
    models::{Notification, NotificationKind},
    traits::Notifier,
    Result, SchedulerError,
};

/// 记录所有通知的测试通知器
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次发送都返回错误的通知器
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    pub async fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|notification| notification.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        if self.fail {
            return Err(SchedulerError::Notification(
                "recording notifier configured to fail".to_string(),
            ));
        }
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}
