use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("作业未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("运行实例未找到: {id}")]
    RunNotFound { id: i64 },

    #[error("Worker未找到: {key}")]
    WorkerNotFound { key: String },

    #[error("终止请求未找到: {id}")]
    KillRequestNotFound { id: i64 },

    #[error("无法重新调度作业 {job_id}: {message}")]
    RescheduleFailed { job_id: i64, message: String },

    #[error("检测到循环依赖: 作业 {job_id}")]
    CircularDependency { job_id: i64 },

    #[error("无效的作业定义: {0}")]
    InvalidJob(String),

    #[error("无效的运行实例更新: {0}")]
    InvalidRunUpdate(String),

    #[error("Worker {worker} 无权操作运行实例 {run_id}")]
    WorkerMismatch { worker: String, run_id: i64 },

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("通知发送错误: {0}")]
    Notification(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 是否为预期内的业务错误（不需要回滚整个扫描）
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            SchedulerError::RescheduleFailed { .. }
                | SchedulerError::InvalidRunUpdate(_)
                | SchedulerError::WorkerMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::RescheduleFailed {
            job_id: 7,
            message: "排除时间窗口覆盖全天".to_string(),
        };
        assert_eq!(err.to_string(), "无法重新调度作业 7: 排除时间窗口覆盖全天");
        assert!(err.is_expected());

        let err = SchedulerError::RunNotFound { id: 3 };
        assert!(!err.is_expected());
    }

    #[test]
    fn test_from_serde_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SchedulerError = parse_err.into();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }
}
