use async_trait::async_trait;
use jobrunner_core::{
    config::NotificationConfig, models::Notification, traits::Notifier, SchedulerError,
    SchedulerResult,
};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct WebhookPayload<'a> {
    kind: &'static str,
    subject: &'a str,
    recipients: &'a [String],
    context: &'a serde_json::Value,
    from: &'a str,
    hostname: &'a str,
}

/// 通过HTTP POST把通知转交给外部的发送服务
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    from_address: String,
    hostname: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, config: &NotificationConfig) -> SchedulerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.webhook_timeout_seconds))
            .build()
            .map_err(|e| SchedulerError::Notification(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            url: url.to_string(),
            from_address: config.from_address.clone(),
            hostname: config.resolved_hostname(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> SchedulerResult<()> {
        let payload = WebhookPayload {
            kind: notification.kind.as_str(),
            subject: &notification.subject,
            recipients: &notification.recipients,
            context: &notification.context,
            from: &self.from_address,
            hostname: &self.hostname,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SchedulerError::Notification(format!("发送通知失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchedulerError::Notification(format!(
                "通知服务返回错误状态: {status}"
            )));
        }

        debug!(
            kind = notification.kind.as_str(),
            recipients = notification.recipients.len(),
            "通知已发送"
        );
        Ok(())
    }
}
