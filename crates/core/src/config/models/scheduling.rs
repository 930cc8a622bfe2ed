use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// 调度时间配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulingConfig {
    /// IANA时区名称，排除窗口和夏令时修正都基于此时区
    pub timezone: String,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

impl SchedulingConfig {
    pub fn tz(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("无效的时区 {}: {}", self.timezone, e))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.tz().map(|_| ())
    }
}

/// 通知配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    /// 所有通知都会抄送的管理员地址
    pub admin_emails: Vec<String>,
    /// 通知内容中使用的主机名，未设置时取本机主机名
    pub hostname: Option<String>,
    pub from_address: String,
    /// 设置后通过HTTP webhook发送通知，否则只写日志
    pub webhook_url: Option<String>,
    pub webhook_timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            admin_emails: Vec::new(),
            hostname: None,
            from_address: "jobrunner@localhost".to_string(),
            webhook_url: None,
            webhook_timeout_seconds: 10,
        }
    }
}

impl NotificationConfig {
    pub fn resolved_hostname(&self) -> String {
        match &self.hostname {
            Some(hostname) => hostname.clone(),
            None => hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(url) = &self.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(anyhow::anyhow!("Webhook URL必须以http://或https://开头"));
            }
        }

        if self.admin_emails.iter().any(|address| !address.contains('@')) {
            return Err(anyhow::anyhow!("管理员邮箱地址格式无效"));
        }

        if self.webhook_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Webhook超时时间必须大于0"));
        }

        Ok(())
    }
}
