pub mod app_config;
pub mod database;
pub mod dispatcher;
pub mod message_queue;
pub mod observability;
pub mod scheduling;

pub use app_config::{AppConfig, ENV_PREFIX};
pub use database::DatabaseConfig;
pub use dispatcher::{DispatcherConfig, HealthCheckConfig, WorkerPingConfig};
pub use message_queue::{MessageQueueConfig, MessageQueueType};
pub use observability::ObservabilityConfig;
pub use scheduling::{NotificationConfig, SchedulingConfig};
