use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::job::parse_notification_addresses;

/// Worker节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub id: i64,
    pub title: String,
    pub api_key: String,
    pub enqueue_is_enabled: bool,
    pub ping_response_dts: Option<DateTime<Utc>>,
    pub worker_version: Option<String>,
    pub concurrent_jobs: Option<i32>,
}

impl Worker {
    pub fn new(title: &str, api_key: &str) -> Self {
        Self {
            id: 0,
            title: title.to_string(),
            api_key: api_key.to_string(),
            enqueue_is_enabled: true,
            ping_response_dts: None,
            worker_version: None,
            concurrent_jobs: None,
        }
    }

    /// 最近一次心跳响应是否在阈值之内。从未响应过的Worker视为无响应
    pub fn is_responsive(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        match self.ping_response_dts {
            Some(last) => now - last <= threshold,
            None => false,
        }
    }

    pub fn record_ping_response(&mut self, response: &PingResponse, now: DateTime<Utc>) {
        self.ping_response_dts = Some(now);
        self.worker_version = response.worker_version.clone();
        self.concurrent_jobs = response.concurrent_jobs;
    }
}

/// Worker池
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerPool {
    pub id: i64,
    pub title: String,
    pub enqueue_is_enabled: bool,
    pub notification_addresses: String,
}

impl WorkerPool {
    pub fn new(title: &str) -> Self {
        Self {
            id: 0,
            title: title.to_string(),
            enqueue_is_enabled: true,
            notification_addresses: String::new(),
        }
    }

    pub fn get_notification_addresses(&self) -> Vec<String> {
        parse_notification_addresses(&self.notification_addresses)
    }
}

/// Worker心跳响应内容
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PingResponse {
    pub worker_version: Option<String>,
    pub concurrent_jobs: Option<i32>,
}
