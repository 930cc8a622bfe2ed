pub mod job;
pub mod kill_request;
pub mod message;
pub mod notification;
pub mod run;
pub mod worker;

pub use job::{
    parse_notification_addresses, IntervalType, Job, JobContext, JobTemplate, Project,
    RescheduleExclude, RescheduleType,
};
pub use kill_request::{KillRequest, KillRequestUpdate};
pub use message::{worker_channel, DispatchMessage, OutboundMessage, RunEvent};
pub use notification::{Notification, NotificationKind};
pub use run::{Run, RunLog, RunState, RunUpdate};
pub use worker::{PingResponse, Worker, WorkerPool};
