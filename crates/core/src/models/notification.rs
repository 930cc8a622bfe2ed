use serde::{Deserialize, Serialize};

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    RescheduleFailed,
    RunFailed,
    WorkerPoolUnresponsive,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::RescheduleFailed => "RESCHEDULE_FAILED",
            NotificationKind::RunFailed => "RUN_FAILED",
            NotificationKind::WorkerPoolUnresponsive => "WORKER_POOL_UNRESPONSIVE",
        }
    }
}

/// 待发送的通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject: String,
    /// 已去重的收件人
    pub recipients: Vec<String>,
    pub context: serde_json::Value,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        subject: impl Into<String>,
        recipients: Vec<String>,
        context: serde_json::Value,
    ) -> Self {
        let mut unique = Vec::with_capacity(recipients.len());
        for address in recipients {
            if !unique.contains(&address) {
                unique.push(address);
            }
        }

        Self {
            kind,
            subject: subject.into(),
            recipients: unique,
            context,
        }
    }
}
