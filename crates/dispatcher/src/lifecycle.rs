//! 运行实例返回后的处理
//!
//! 在更新运行实例的同一事务内调用：维护失败计数、在整个批次都返回后
//! 重新调度作业并调度子作业。产生的通知由调用方在事务提交后发送。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use jobrunner_core::{
    models::{JobContext, Notification, Run},
    traits::StoreTransaction,
    SchedulerError, SchedulerResult,
};
use jobrunner_infrastructure::{MetricsCollector, StructuredLogger};

use crate::notifications::NotificationSettings;
use crate::reschedule::RescheduleEngine;

/// 处理结果
#[derive(Debug, Default)]
pub struct LifecycleOutcome {
    /// 事务提交后待发送的通知
    pub notifications: Vec<Notification>,
    /// 本次新建的运行实例（重新调度和子作业）
    pub scheduled_runs: Vec<Run>,
}

impl LifecycleOutcome {
    pub fn merge(&mut self, other: LifecycleOutcome) {
        self.notifications.extend(other.notifications);
        self.scheduled_runs.extend(other.scheduled_runs);
    }
}

pub struct RunLifecycleHandler {
    engine: RescheduleEngine,
    notification_settings: NotificationSettings,
    metrics: Arc<MetricsCollector>,
}

impl RunLifecycleHandler {
    pub fn new(
        engine: RescheduleEngine,
        notification_settings: NotificationSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            engine,
            notification_settings,
            metrics,
        }
    }

    pub fn engine(&self) -> &RescheduleEngine {
        &self.engine
    }

    pub fn notification_settings(&self) -> &NotificationSettings {
        &self.notification_settings
    }

    /// 运行实例刚刚返回时调用，`run` 必须已在本事务中保存
    pub async fn on_run_returned(
        &self,
        tx: &mut dyn StoreTransaction,
        run: &Run,
        now: DateTime<Utc>,
    ) -> SchedulerResult<LifecycleOutcome> {
        let mut outcome = LifecycleOutcome::default();
        let success = run.is_successful();

        let mut job = tx
            .lock_job(run.job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound { id: run.job_id })?;

        StructuredLogger::log_run_returned(run.id, job.id, success);
        self.metrics.record_run_returned(success);

        if success {
            job.record_success();
        } else if job.record_failure() {
            StructuredLogger::log_job_disabled(job.id, job.fail_times);
            self.metrics.record_job_auto_disabled();
        }
        job.last_completed_schedule_id = Some(run.schedule_id);
        tx.update_job(&job).await?;

        if !success {
            let context = self.load_context(tx, job.id).await?;
            outcome
                .notifications
                .push(self.notification_settings.run_failed(&context, run));
        }

        let siblings = tx
            .lock_unfinished_batch_runs(run.schedule_id, run.id)
            .await?;
        if !siblings.is_empty() {
            debug!(
                "批次 {} 还有 {} 个运行实例未返回，等待其完成",
                run.schedule_id,
                siblings.len()
            );
            return Ok(outcome);
        }

        match self.engine.reschedule(tx, &job, now).await {
            Ok(Some(next_run)) => outcome.scheduled_runs.push(next_run),
            Ok(None) => {}
            Err(SchedulerError::RescheduleFailed { job_id, message }) => {
                StructuredLogger::log_reschedule_failed(job_id, &message);
                self.metrics.record_reschedule_failure();
                let context = self.load_context(tx, job.id).await?;
                outcome
                    .notifications
                    .push(self.notification_settings.reschedule_failed(&context, &message));
            }
            Err(e) => return Err(e),
        }

        if run.schedule_children {
            let batch = tx.get_batch_runs(run.schedule_id).await?;
            let batch_succeeded = batch.iter().all(Run::is_successful);

            if batch_succeeded || job.schedule_children_on_error {
                for child in tx.get_child_jobs(job.id).await? {
                    if !child.enqueue_is_enabled {
                        debug!("子作业 {} 未启用入队，跳过", child.id);
                        continue;
                    }
                    if let Some(child_run) = self.engine.schedule_now(tx, child.id, now).await? {
                        info!("作业 {} 完成后调度子作业 {}", job.id, child.id);
                        outcome.scheduled_runs.push(child_run);
                    }
                }
            }
        }

        Ok(outcome)
    }

    async fn load_context(
        &self,
        tx: &mut dyn StoreTransaction,
        job_id: i64,
    ) -> SchedulerResult<JobContext> {
        tx.get_job_context(job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound { id: job_id })
    }
}
