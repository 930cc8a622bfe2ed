use async_trait::async_trait;
use jobrunner_core::{models::Notification, traits::Notifier, SchedulerResult};
use tracing::warn;

/// 只写日志的通知器，未配置webhook时使用
#[derive(Debug, Clone)]
pub struct LogNotifier {
    hostname: String,
}

impl LogNotifier {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> SchedulerResult<()> {
        warn!(
            event = "notification",
            notification.kind = notification.kind.as_str(),
            notification.recipients = ?notification.recipients,
            notification.context = %notification.context,
            hostname = %self.hostname,
            "{}",
            notification.subject
        );
        Ok(())
    }
}
