use serde::{Deserialize, Serialize};

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    pub enabled: bool,
    pub poll_interval_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 5,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("分发轮询间隔必须大于0"));
        }
        Ok(())
    }
}

/// Worker心跳配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerPingConfig {
    pub interval_seconds: u64,
    pub margin_seconds: u64,
    /// 连续错过多少个心跳间隔后视为无响应
    pub unresponsive_after_intervals: u32,
}

impl Default for WorkerPingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            margin_seconds: 15,
            unresponsive_after_intervals: 3,
        }
    }
}

impl WorkerPingConfig {
    /// 超过此时长没有心跳响应的Worker视为无响应
    pub fn unresponsive_threshold(&self) -> chrono::Duration {
        let seconds = self.interval_seconds * u64::from(self.unresponsive_after_intervals)
            + self.margin_seconds;
        chrono::Duration::seconds(seconds as i64)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }
        if self.unresponsive_after_intervals == 0 {
            return Err(anyhow::anyhow!("无响应判定的心跳次数必须大于0"));
        }
        Ok(())
    }
}

/// 健康检查配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
        }
    }
}

impl HealthCheckConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval_seconds == 0 {
            return Err(anyhow::anyhow!("健康检查间隔必须大于0"));
        }
        Ok(())
    }
}
