//! 作业重新调度
//!
//! 运行批次全部返回后，根据作业的重新调度间隔计算下一次计划时间，
//! 跳过排除时间窗口并修正夏令时差。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

use jobrunner_core::{
    models::{IntervalType, Job, RescheduleExclude, RescheduleType, Run},
    traits::StoreTransaction,
    SchedulerError, SchedulerResult,
};
use jobrunner_infrastructure::{MetricsCollector, StructuredLogger};

use crate::calendar::{correct_dst_offset, increment};

/// 计算下一次调度时间
///
/// 从参考时间开始按间隔推进，直到不早于 `now`；落在排除窗口内时以该候选时间为起点
/// 继续推进。起点距参考时间超过一天仍找不到可用时间，或推进超出可表示的时间范围时
/// 返回 [`SchedulerError::RescheduleFailed`]。
pub fn next_schedule_date(
    job_id: i64,
    reference: DateTime<Utc>,
    interval_type: IntervalType,
    interval: u32,
    excludes: &[RescheduleExclude],
    now: DateTime<Utc>,
    tz: Tz,
) -> SchedulerResult<DateTime<Utc>> {
    let local_reference = reference.with_timezone(&tz);
    let mut increment_from = local_reference;
    let step = |dts: DateTime<Tz>| {
        increment(dts, interval_type, interval).ok_or_else(|| SchedulerError::RescheduleFailed {
            job_id,
            message: format!("重新调度间隔 {interval} 超出可表示的时间范围"),
        })
    };

    loop {
        let mut candidate = step(increment_from)?;
        while candidate.with_timezone(&Utc) < now {
            candidate = step(candidate)?;
        }

        if increment_from - local_reference > Duration::days(1) {
            return Err(SchedulerError::RescheduleFailed {
                job_id,
                message: "排除时间窗口覆盖了所有可用时间".to_string(),
            });
        }

        let local_time = candidate.time();
        if let Some(exclude) = excludes.iter().find(|exclude| exclude.contains(local_time)) {
            debug!(
                "作业 {} 的候选时间 {} 落在排除窗口 {}-{} 内",
                job_id, candidate, exclude.start_time, exclude.end_time
            );
            increment_from = candidate;
            continue;
        }

        return Ok(correct_dst_offset(
            reference,
            candidate.with_timezone(&Utc),
            tz,
        ));
    }
}

/// 重新调度引擎
pub struct RescheduleEngine {
    tz: Tz,
    metrics: Arc<MetricsCollector>,
}

impl RescheduleEngine {
    pub fn new(tz: Tz, metrics: Arc<MetricsCollector>) -> Self {
        Self { tz, metrics }
    }

    /// 在 `dts` 创建运行实例
    ///
    /// 作业已有到期且未返回的非手动运行实例时不再创建，返回 `None`。
    pub async fn schedule(
        &self,
        tx: &mut dyn StoreTransaction,
        job_id: i64,
        dts: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<Run>> {
        if tx.has_due_pending_run(job_id, now).await? {
            debug!("作业 {} 已有到期未完成的运行实例，跳过调度", job_id);
            return Ok(None);
        }

        let run = tx.create_run(&Run::new(job_id, dts)).await?;
        StructuredLogger::log_run_scheduled(run.id, job_id, run.schedule_dts, false);
        self.metrics.record_run_scheduled();

        Ok(Some(run))
    }

    pub async fn schedule_now(
        &self,
        tx: &mut dyn StoreTransaction,
        job_id: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<Run>> {
        self.schedule(tx, job_id, now, now).await
    }

    /// 手动运行：立即到期，不受入队开关限制
    pub async fn schedule_manual(
        &self,
        tx: &mut dyn StoreTransaction,
        job_id: i64,
        schedule_children: bool,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Run> {
        let mut run = Run::new(job_id, now);
        run.is_manual = true;
        run.schedule_children = schedule_children;

        let run = tx.create_run(&run).await?;
        StructuredLogger::log_run_scheduled(run.id, job_id, run.schedule_dts, true);
        self.metrics.record_run_scheduled();

        Ok(run)
    }

    /// 重新调度作业
    ///
    /// 作业还有未返回的运行实例、未配置间隔或没有历史非手动运行时不做任何事。
    pub async fn reschedule(
        &self,
        tx: &mut dyn StoreTransaction,
        job: &Job,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<Run>> {
        if tx.has_unfinished_runs(job.id).await? {
            debug!("作业 {} 还有未完成的运行实例，暂不重新调度", job.id);
            return Ok(None);
        }

        let Some((interval_type, interval)) = job.reschedule_config() else {
            return Ok(None);
        };

        let Some(last_run) = tx.get_last_scheduled_run(job.id).await? else {
            return Ok(None);
        };

        let reference = match job.reschedule_type {
            RescheduleType::AfterScheduleDts => Some(last_run.schedule_dts),
            RescheduleType::AfterCompleteDts => last_run.return_dts,
        };
        let Some(reference) = reference else {
            return Ok(None);
        };

        let excludes = tx.get_reschedule_excludes(job.id).await?;
        let next = next_schedule_date(
            job.id,
            reference,
            interval_type,
            interval,
            &excludes,
            now,
            self.tz,
        )?;

        debug!(
            "作业 {} 重新调度: 参考时间 {} -> {}",
            job.id, reference, next
        );

        self.schedule(tx, job.id, next, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, h, m, 0).unwrap()
    }

    fn exclude(start: (u32, u32), end: (u32, u32)) -> RescheduleExclude {
        RescheduleExclude::new(
            1,
            NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
        )
    }

    #[test]
    fn test_next_date_without_excludes() {
        let next =
            next_schedule_date(1, at(10, 0), IntervalType::Hour, 1, &[], at(9, 0), Tz::UTC).unwrap();
        assert_eq!(next, at(11, 0));
    }

    #[test]
    fn test_next_date_is_never_in_the_past() {
        let reference = at(10, 0) - Duration::days(3);
        let now = at(10, 7);
        let next =
            next_schedule_date(1, reference, IntervalType::Minute, 5, &[], now, Tz::UTC).unwrap();
        assert!(next >= now);
        assert_eq!(next, at(10, 10));
    }

    #[test]
    fn test_next_date_skips_exclude_window() {
        let excludes = [exclude((11, 0), (13, 0))];
        let next = next_schedule_date(
            1,
            at(10, 0),
            IntervalType::Hour,
            1,
            &excludes,
            at(9, 0),
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(next, at(14, 0));
    }

    #[test]
    fn test_full_day_exclude_fails() {
        let excludes = [exclude((0, 0), (23, 59))];
        let result = next_schedule_date(
            7,
            at(10, 0),
            IntervalType::Hour,
            1,
            &excludes,
            at(9, 0),
            Tz::UTC,
        );
        assert!(matches!(
            result,
            Err(SchedulerError::RescheduleFailed { job_id: 7, .. })
        ));
    }

    #[test]
    fn test_interval_out_of_range_fails() {
        let result = next_schedule_date(
            3,
            at(10, 0),
            IntervalType::Day,
            i32::MAX as u32,
            &[],
            at(9, 0),
            Tz::UTC,
        );
        assert!(matches!(
            result,
            Err(SchedulerError::RescheduleFailed { job_id: 3, .. })
        ));
    }

    #[test]
    fn test_exclude_window_uses_local_time() {
        // 12:00 UTC 在阿姆斯特丹夏令时为 14:00
        let excludes = [exclude((14, 0), (14, 30))];
        let next = next_schedule_date(
            1,
            at(11, 0),
            IntervalType::Hour,
            1,
            &excludes,
            at(9, 0),
            chrono_tz::Europe::Amsterdam,
        )
        .unwrap();
        assert_eq!(next, at(13, 0));
    }

    #[test]
    fn test_daily_reschedule_across_dst_start() {
        let tz = chrono_tz::Europe::Amsterdam;
        let reference = tz
            .with_ymd_and_hms(2024, 3, 30, 4, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let next =
            next_schedule_date(1, reference, IntervalType::Day, 1, &[], reference, tz).unwrap();
        assert_eq!(
            next.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
            "2024-03-31 04:00"
        );
    }
}
