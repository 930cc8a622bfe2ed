//! 作业调度与分发
//!
//! - [`broadcaster`]：把到期的运行实例、终止请求和ping发布给Worker
//! - [`health_monitor`]：检测无响应的Worker和Worker池
//! - [`lifecycle`]：运行实例返回后的失败计数、重新调度和子作业调度
//! - [`controller`]：运维操作和Worker回调入口

pub mod broadcaster;
pub mod calendar;
pub mod controller;
pub mod health_monitor;
pub mod lifecycle;
pub mod notifications;
pub mod reschedule;
pub mod strategies;

pub use broadcaster::{DispatchBroadcaster, SweepSummary};
pub use controller::JobController;
pub use health_monitor::{HealthMonitor, HealthReport};
pub use lifecycle::{LifecycleOutcome, RunLifecycleHandler};
pub use notifications::NotificationSettings;
pub use reschedule::RescheduleEngine;
pub use strategies::{RandomStrategy, WorkerSelectionStrategy};
