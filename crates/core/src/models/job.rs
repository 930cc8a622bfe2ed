use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::WorkerPool;

/// 解析以换行分隔的通知地址列表
pub fn parse_notification_addresses(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// 重新调度的间隔类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IntervalType {
    #[serde(rename = "MINUTE")]
    Minute,
    #[serde(rename = "HOUR")]
    Hour,
    #[serde(rename = "DAY")]
    Day,
    #[serde(rename = "MONTH")]
    Month,
}

impl IntervalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalType::Minute => "MINUTE",
            IntervalType::Hour => "HOUR",
            IntervalType::Day => "DAY",
            IntervalType::Month => "MONTH",
        }
    }
}

impl fmt::Display for IntervalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MINUTE" => Ok(IntervalType::Minute),
            "HOUR" => Ok(IntervalType::Hour),
            "DAY" => Ok(IntervalType::Day),
            "MONTH" => Ok(IntervalType::Month),
            _ => Err(format!("Invalid reschedule interval type: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for IntervalType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for IntervalType {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(s.parse::<IntervalType>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for IntervalType {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 重新调度的参考时间来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum RescheduleType {
    /// 以上一次运行的计划时间为参考
    #[default]
    #[serde(rename = "AFTER_SCHEDULE_DTS")]
    AfterScheduleDts,
    /// 以上一次运行的返回时间为参考
    #[serde(rename = "AFTER_COMPLETE_DTS")]
    AfterCompleteDts,
}

impl RescheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RescheduleType::AfterScheduleDts => "AFTER_SCHEDULE_DTS",
            RescheduleType::AfterCompleteDts => "AFTER_COMPLETE_DTS",
        }
    }
}

impl FromStr for RescheduleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AFTER_SCHEDULE_DTS" => Ok(RescheduleType::AfterScheduleDts),
            "AFTER_COMPLETE_DTS" => Ok(RescheduleType::AfterCompleteDts),
            _ => Err(format!("Invalid reschedule type: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for RescheduleType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for RescheduleType {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(s.parse::<RescheduleType>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for RescheduleType {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 项目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub enqueue_is_enabled: bool,
    pub notification_addresses: String,
    /// 该项目下作业可以使用的Worker池
    pub worker_pool_ids: Vec<i64>,
}

impl Project {
    pub fn get_notification_addresses(&self) -> Vec<String> {
        parse_notification_addresses(&self.notification_addresses)
    }
}

/// 作业模板
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobTemplate {
    pub id: i64,
    pub title: String,
    pub project_id: i64,
    pub enqueue_is_enabled: bool,
    pub notification_addresses: String,
}

impl JobTemplate {
    pub fn get_notification_addresses(&self) -> Vec<String> {
        parse_notification_addresses(&self.notification_addresses)
    }
}

/// 作业定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: i64,
    pub title: String,
    pub parent_id: Option<i64>,
    pub job_template_id: i64,
    pub worker_pool_id: i64,
    pub enqueue_is_enabled: bool,
    pub run_on_all_workers: bool,
    pub schedule_children_on_error: bool,
    pub reschedule_interval: Option<i32>,
    pub reschedule_interval_type: Option<IntervalType>,
    pub reschedule_type: RescheduleType,
    pub notification_addresses: String,
    /// 连续失败次数
    pub fail_times: i32,
    /// 连续失败超过此次数后自动禁用入队（None或0表示永不禁用）
    pub disable_enqueue_after_fails: Option<i32>,
    pub last_completed_schedule_id: Option<i64>,
}

impl Job {
    pub fn new(title: &str, job_template_id: i64, worker_pool_id: i64) -> Self {
        Self {
            id: 0, // 将由数据库生成
            title: title.to_string(),
            parent_id: None,
            job_template_id,
            worker_pool_id,
            enqueue_is_enabled: true,
            run_on_all_workers: false,
            schedule_children_on_error: false,
            reschedule_interval: None,
            reschedule_interval_type: None,
            reschedule_type: RescheduleType::default(),
            notification_addresses: String::new(),
            fail_times: 0,
            disable_enqueue_after_fails: None,
            last_completed_schedule_id: None,
        }
    }

    /// 返回重新调度配置，只有类型和间隔都设置且间隔为正数时才有效
    pub fn reschedule_config(&self) -> Option<(IntervalType, u32)> {
        match (self.reschedule_interval_type, self.reschedule_interval) {
            (Some(interval_type), Some(interval)) if interval > 0 => {
                Some((interval_type, interval as u32))
            }
            _ => None,
        }
    }

    /// 记录一次失败，返回本次是否触发了自动禁用
    pub fn record_failure(&mut self) -> bool {
        self.fail_times += 1;

        match self.disable_enqueue_after_fails {
            Some(limit) if limit > 0 && self.fail_times > limit && self.enqueue_is_enabled => {
                self.enqueue_is_enabled = false;
                true
            }
            _ => false,
        }
    }

    pub fn record_success(&mut self) {
        self.fail_times = 0;
    }

    pub fn get_notification_addresses(&self) -> Vec<String> {
        parse_notification_addresses(&self.notification_addresses)
    }
}

/// 重新调度排除时间窗口（每日本地时间）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RescheduleExclude {
    pub id: i64,
    pub job_id: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub note: String,
}

impl RescheduleExclude {
    pub fn new(job_id: i64, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            id: 0,
            job_id,
            start_time,
            end_time,
            note: String::new(),
        }
    }

    /// 时间是否落在排除窗口内（包含两端）
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start_time && time <= self.end_time
    }
}

/// 作业及其所属的模板、项目、Worker池
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job: Job,
    pub template: JobTemplate,
    pub project: Project,
    pub pool: WorkerPool,
}

impl JobContext {
    /// 作业、模板、项目和Worker池是否都允许入队
    pub fn enqueue_gate_open(&self) -> bool {
        self.job.enqueue_is_enabled
            && self.template.enqueue_is_enabled
            && self.project.enqueue_is_enabled
            && self.pool.enqueue_is_enabled
    }

    /// 作业自身、模板、项目和Worker池的通知地址
    pub fn notification_addresses(&self) -> Vec<String> {
        let mut addresses = self.job.get_notification_addresses();
        addresses.extend(self.template.get_notification_addresses());
        addresses.extend(self.project.get_notification_addresses());
        addresses.extend(self.pool.get_notification_addresses());
        addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notification_addresses() {
        let addresses = parse_notification_addresses("  ops@example.com\n\n dev@example.com \n");
        assert_eq!(addresses, vec!["ops@example.com", "dev@example.com"]);
        assert!(parse_notification_addresses("").is_empty());
    }

    #[test]
    fn test_reschedule_config() {
        let mut job = Job::new("nightly", 1, 1);
        assert!(job.reschedule_config().is_none());

        job.reschedule_interval_type = Some(IntervalType::Day);
        assert!(job.reschedule_config().is_none());

        job.reschedule_interval = Some(0);
        assert!(job.reschedule_config().is_none());

        job.reschedule_interval = Some(2);
        assert_eq!(job.reschedule_config(), Some((IntervalType::Day, 2)));
    }

    #[test]
    fn test_record_failure_disables_after_threshold() {
        let mut job = Job::new("flaky", 1, 1);
        job.disable_enqueue_after_fails = Some(3);

        for _ in 0..3 {
            assert!(!job.record_failure());
            assert!(job.enqueue_is_enabled);
        }

        assert!(job.record_failure());
        assert_eq!(job.fail_times, 4);
        assert!(!job.enqueue_is_enabled);

        job.record_success();
        assert_eq!(job.fail_times, 0);
    }

    #[test]
    fn test_zero_threshold_never_disables() {
        let mut job = Job::new("flaky", 1, 1);
        job.disable_enqueue_after_fails = Some(0);
        for _ in 0..10 {
            job.record_failure();
        }
        assert!(job.enqueue_is_enabled);
    }

    #[test]
    fn test_exclude_contains_is_inclusive() {
        let exclude = RescheduleExclude::new(
            1,
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        );
        assert!(exclude.contains(NaiveTime::from_hms_opt(11, 0, 0).unwrap()));
        assert!(exclude.contains(NaiveTime::from_hms_opt(13, 0, 0).unwrap()));
        assert!(!exclude.contains(NaiveTime::from_hms_opt(13, 0, 1).unwrap()));
        assert!(!exclude.contains(NaiveTime::from_hms_opt(10, 59, 59).unwrap()));
    }

    #[test]
    fn test_interval_type_round_trip_str() {
        for t in [
            IntervalType::Minute,
            IntervalType::Hour,
            IntervalType::Day,
            IntervalType::Month,
        ] {
            assert_eq!(t.as_str().parse::<IntervalType>().unwrap(), t);
        }
        assert!("WEEK".parse::<IntervalType>().is_err());
    }
}
