//! 通知内容构建
//!
//! 收件人由作业、模板、项目、Worker池的地址以及管理员地址组成，
//! 在 [`Notification::new`] 中去重。

use serde_json::json;
use tracing::error;

use jobrunner_core::{
    models::{JobContext, Notification, NotificationKind, Run, WorkerPool},
    traits::Notifier,
};

/// 通知的公共参数
#[derive(Debug, Clone, Default)]
pub struct NotificationSettings {
    pub admin_emails: Vec<String>,
    pub hostname: String,
}

impl NotificationSettings {
    pub fn new(admin_emails: Vec<String>, hostname: impl Into<String>) -> Self {
        Self {
            admin_emails,
            hostname: hostname.into(),
        }
    }

    fn recipients(&self, addresses: Vec<String>) -> Vec<String> {
        let mut recipients = self.admin_emails.clone();
        recipients.extend(addresses);
        recipients
    }

    /// 作业无法计算下一次调度时间
    pub fn reschedule_failed(&self, context: &JobContext, reason: &str) -> Notification {
        Notification::new(
            NotificationKind::RescheduleFailed,
            format!("Reschedule error for: {}", context.job.title),
            self.recipients(context.notification_addresses()),
            json!({
                "job_id": context.job.id,
                "job_title": context.job.title,
                "reason": reason,
                "hostname": self.hostname,
            }),
        )
    }

    /// 运行实例以失败返回
    pub fn run_failed(&self, context: &JobContext, run: &Run) -> Notification {
        Notification::new(
            NotificationKind::RunFailed,
            format!("Run error for: {}", context.job.title),
            self.recipients(context.notification_addresses()),
            json!({
                "job_id": context.job.id,
                "job_title": context.job.title,
                "run_id": run.id,
                "schedule_id": run.schedule_id,
                "schedule_dts": run.schedule_dts,
                "return_dts": run.return_dts,
                "fail_times": context.job.fail_times,
                "hostname": self.hostname,
            }),
        )
    }

    /// Worker池中所有允许入队的Worker都无响应
    pub fn worker_pool_unresponsive(&self, pool: &WorkerPool, worker_keys: &[String]) -> Notification {
        Notification::new(
            NotificationKind::WorkerPoolUnresponsive,
            format!("Worker-pool unresponsive: {}", pool.title),
            self.recipients(pool.get_notification_addresses()),
            json!({
                "worker_pool_id": pool.id,
                "worker_pool_title": pool.title,
                "workers": worker_keys,
                "hostname": self.hostname,
            }),
        )
    }
}

/// 逐条发送通知，单条失败只记录日志
pub async fn deliver(notifier: &dyn Notifier, notifications: &[Notification]) {
    for notification in notifications {
        if let Err(e) = notifier.notify(notification).await {
            error!(
                "发送通知失败 ({}): {}",
                notification.kind.as_str(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobrunner_core::models::{Job, JobTemplate, Project};

    fn context() -> JobContext {
        let mut job = Job::new("nightly-report", 1, 1);
        job.id = 5;
        job.notification_addresses = "job@example.com".to_string();
        let mut pool = WorkerPool::new("pool");
        pool.id = 1;
        pool.notification_addresses = "pool@example.com\nadmin@example.com".to_string();
        JobContext {
            job,
            template: JobTemplate {
                id: 1,
                title: "template".to_string(),
                project_id: 1,
                enqueue_is_enabled: true,
                notification_addresses: "template@example.com".to_string(),
            },
            project: Project {
                id: 1,
                title: "project".to_string(),
                enqueue_is_enabled: true,
                notification_addresses: "project@example.com".to_string(),
                worker_pool_ids: vec![1],
            },
            pool,
        }
    }

    #[test]
    fn test_reschedule_failed_recipients() {
        let settings = NotificationSettings::new(vec!["admin@example.com".to_string()], "master-1");
        let notification = settings.reschedule_failed(&context(), "excluded");

        assert_eq!(notification.kind, NotificationKind::RescheduleFailed);
        assert_eq!(notification.subject, "Reschedule error for: nightly-report");
        assert_eq!(
            notification.recipients,
            vec![
                "admin@example.com",
                "job@example.com",
                "template@example.com",
                "project@example.com",
                "pool@example.com",
            ]
        );
        assert_eq!(notification.context["hostname"], "master-1");
        assert_eq!(notification.context["job_id"], 5);
    }

    #[test]
    fn test_pool_notification_only_uses_pool_and_admins() {
        let settings = NotificationSettings::new(vec!["admin@example.com".to_string()], "master-1");
        let pool = context().pool;
        let notification = settings.worker_pool_unresponsive(&pool, &["key-1".to_string()]);

        assert_eq!(notification.kind, NotificationKind::WorkerPoolUnresponsive);
        assert_eq!(
            notification.recipients,
            vec!["admin@example.com", "pool@example.com"]
        );
        assert_eq!(notification.context["workers"][0], "key-1");
    }
}
