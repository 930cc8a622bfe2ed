use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SchedulerError};

/// 运行实例状态，由时间戳推导
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Scheduled,
    InQueue,
    Started,
    CompletedSuccessful,
    CompletedWithError,
}

/// 作业的一次执行实例
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub id: i64,
    pub job_id: i64,
    /// 同一批次（多Worker扇出）共享的标识，0表示创建时使用自身ID
    pub schedule_id: i64,
    pub worker_id: Option<i64>,
    pub schedule_dts: DateTime<Utc>,
    pub enqueue_dts: Option<DateTime<Utc>>,
    pub start_dts: Option<DateTime<Utc>>,
    pub return_dts: Option<DateTime<Utc>>,
    pub return_success: Option<bool>,
    pub pid: Option<i64>,
    pub is_manual: bool,
    pub schedule_children: bool,
}

impl Run {
    pub fn new(job_id: i64, schedule_dts: DateTime<Utc>) -> Self {
        Self {
            id: 0, // 将由数据库生成
            job_id,
            schedule_id: 0,
            worker_id: None,
            schedule_dts,
            enqueue_dts: None,
            start_dts: None,
            return_dts: None,
            return_success: None,
            pid: None,
            is_manual: false,
            schedule_children: true,
        }
    }

    pub fn state(&self) -> RunState {
        match (
            self.enqueue_dts,
            self.start_dts,
            self.return_dts,
            self.return_success,
        ) {
            (_, _, Some(_), Some(true)) => RunState::CompletedSuccessful,
            (_, _, Some(_), _) => RunState::CompletedWithError,
            (_, Some(_), None, _) => RunState::Started,
            (Some(_), None, None, _) => RunState::InQueue,
            _ => RunState::Scheduled,
        }
    }

    pub fn is_returned(&self) -> bool {
        self.return_dts.is_some()
    }

    pub fn is_successful(&self) -> bool {
        self.return_dts.is_some() && self.return_success == Some(true)
    }

    /// 已入队但尚未返回
    pub fn is_unreturned(&self) -> bool {
        self.enqueue_dts.is_some() && self.return_dts.is_none()
    }

    /// 强制标记为失败，缺失的时间戳用当前时间补齐。已返回的实例不做改动
    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_returned() {
            return false;
        }

        self.enqueue_dts.get_or_insert(now);
        self.start_dts.get_or_insert(now);
        self.return_dts = Some(now);
        self.return_success = Some(false);
        true
    }

    /// 应用Worker上报的状态更新，返回本次更新是否使实例进入已返回状态
    ///
    /// 时间戳只能按 入队 -> 开始 -> 返回 的顺序单调填充，已设置的时间戳不会被覆盖。
    pub fn apply_update(&mut self, update: &RunUpdate) -> Result<bool> {
        if self.is_returned() {
            return Err(SchedulerError::InvalidRunUpdate(format!(
                "运行实例 {} 已经返回",
                self.id
            )));
        }

        let enqueue_dts = self.enqueue_dts.or(update.enqueue_dts);
        let start_dts = self.start_dts.or(update.start_dts);

        if start_dts.is_some() && enqueue_dts.is_none() {
            return Err(SchedulerError::InvalidRunUpdate(format!(
                "运行实例 {} 尚未入队，不能设置开始时间",
                self.id
            )));
        }
        if update.return_dts.is_some() {
            if start_dts.is_none() {
                return Err(SchedulerError::InvalidRunUpdate(format!(
                    "运行实例 {} 尚未开始，不能设置返回时间",
                    self.id
                )));
            }
            if update.return_success.is_none() {
                return Err(SchedulerError::InvalidRunUpdate(format!(
                    "运行实例 {} 的返回结果缺失",
                    self.id
                )));
            }
        }

        self.enqueue_dts = enqueue_dts;
        self.start_dts = start_dts;
        if self.pid.is_none() {
            self.pid = update.pid;
        }

        if let Some(return_dts) = update.return_dts {
            self.return_dts = Some(return_dts);
            self.return_success = update.return_success;
            return Ok(true);
        }

        Ok(false)
    }
}

/// Worker对运行实例的部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunUpdate {
    pub enqueue_dts: Option<DateTime<Utc>>,
    pub start_dts: Option<DateTime<Utc>>,
    pub return_dts: Option<DateTime<Utc>>,
    pub return_success: Option<bool>,
    pub pid: Option<i64>,
    /// 运行日志，随返回一起上报
    pub log: Option<String>,
}

/// 运行日志
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunLog {
    pub run_id: i64,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_run() -> Run {
        let mut run = Run::new(1, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        run.id = 10;
        run.schedule_id = 10;
        run
    }

    #[test]
    fn test_state_transitions() {
        let now = Utc::now();
        let mut run = sample_run();
        assert_eq!(run.state(), RunState::Scheduled);

        run.enqueue_dts = Some(now);
        assert_eq!(run.state(), RunState::InQueue);
        assert!(run.is_unreturned());

        run.start_dts = Some(now);
        assert_eq!(run.state(), RunState::Started);

        run.return_dts = Some(now);
        run.return_success = Some(false);
        assert_eq!(run.state(), RunState::CompletedWithError);
        assert!(!run.is_unreturned());

        run.return_success = Some(true);
        assert_eq!(run.state(), RunState::CompletedSuccessful);
    }

    #[test]
    fn test_mark_failed_fills_timestamps() {
        let now = Utc::now();
        let mut run = sample_run();
        let enqueued = now - Duration::minutes(30);
        run.enqueue_dts = Some(enqueued);

        assert!(run.mark_failed(now));
        assert_eq!(run.enqueue_dts, Some(enqueued));
        assert_eq!(run.start_dts, Some(now));
        assert_eq!(run.return_dts, Some(now));
        assert_eq!(run.return_success, Some(false));

        assert!(!run.mark_failed(now + Duration::minutes(1)));
        assert_eq!(run.return_dts, Some(now));
    }

    #[test]
    fn test_apply_update_in_order() {
        let now = Utc::now();
        let mut run = sample_run();

        let returned = run
            .apply_update(&RunUpdate {
                enqueue_dts: Some(now),
                ..Default::default()
            })
            .unwrap();
        assert!(!returned);

        let returned = run
            .apply_update(&RunUpdate {
                start_dts: Some(now),
                pid: Some(4242),
                ..Default::default()
            })
            .unwrap();
        assert!(!returned);
        assert_eq!(run.pid, Some(4242));

        let returned = run
            .apply_update(&RunUpdate {
                return_dts: Some(now),
                return_success: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert!(returned);
        assert_eq!(run.state(), RunState::CompletedSuccessful);
    }

    #[test]
    fn test_apply_update_rejects_out_of_order() {
        let now = Utc::now();
        let mut run = sample_run();

        let err = run
            .apply_update(&RunUpdate {
                start_dts: Some(now),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRunUpdate(_)));
        assert!(run.start_dts.is_none());

        let err = run
            .apply_update(&RunUpdate {
                enqueue_dts: Some(now),
                return_dts: Some(now),
                return_success: Some(true),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRunUpdate(_)));
        assert!(run.enqueue_dts.is_none());
    }

    #[test]
    fn test_apply_update_does_not_overwrite() {
        let now = Utc::now();
        let later = now + Duration::minutes(5);
        let mut run = sample_run();
        run.enqueue_dts = Some(now);

        run.apply_update(&RunUpdate {
            enqueue_dts: Some(later),
            start_dts: Some(later),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(run.enqueue_dts, Some(now));
        assert_eq!(run.start_dts, Some(later));
    }

    #[test]
    fn test_apply_update_on_returned_run_fails() {
        let now = Utc::now();
        let mut run = sample_run();
        run.mark_failed(now);

        assert!(run
            .apply_update(&RunUpdate {
                pid: Some(1),
                ..Default::default()
            })
            .is_err());
    }
}
