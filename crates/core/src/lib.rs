//! 作业调度核心库：数据模型、分发资格判定、存储与消息接口、配置

pub mod config;
pub mod eligibility;
pub mod errors;
pub mod models;
pub mod traits;

pub use errors::*;

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
