use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 终止运行实例的请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KillRequest {
    pub id: i64,
    pub run_id: i64,
    pub schedule_dts: DateTime<Utc>,
    pub enqueue_dts: Option<DateTime<Utc>>,
    pub execute_dts: Option<DateTime<Utc>>,
}

impl KillRequest {
    pub fn new(run_id: i64, schedule_dts: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            run_id,
            schedule_dts,
            enqueue_dts: None,
            execute_dts: None,
        }
    }
}

/// Worker对终止请求的部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KillRequestUpdate {
    pub enqueue_dts: Option<DateTime<Utc>>,
    pub execute_dts: Option<DateTime<Utc>>,
}
