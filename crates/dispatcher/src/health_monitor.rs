//! Worker和Worker池健康检查
//!
//! 无响应的Worker上未返回的运行实例会被强制标记为失败，
//! 所有Worker都无响应的Worker池会触发告警通知。

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use jobrunner_core::{
    models::{Notification, OutboundMessage, RunEvent, RunLog, Worker},
    traits::{MessagePublisher, Notifier, Store},
    SchedulerResult,
};
use jobrunner_infrastructure::{MetricsCollector, StructuredLogger};

use crate::broadcaster::publish_all;
use crate::lifecycle::{LifecycleOutcome, RunLifecycleHandler};
use crate::notifications::deliver;

/// 写入被强制失败的运行实例日志中的说明
pub const UNRESPONSIVE_WORKER_LOG: &str = "Worker does not respond to ping requests.";

/// 一次健康检查的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub unresponsive_workers: Vec<String>,
    pub failed_run_ids: Vec<i64>,
    pub unresponsive_pool_ids: Vec<i64>,
}

pub struct HealthMonitor {
    store: Arc<dyn Store>,
    publisher: Arc<dyn MessagePublisher>,
    notifier: Arc<dyn Notifier>,
    lifecycle: Arc<RunLifecycleHandler>,
    metrics: Arc<MetricsCollector>,
    event_channel: String,
    unresponsive_threshold: Duration,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn MessagePublisher>,
        notifier: Arc<dyn Notifier>,
        lifecycle: Arc<RunLifecycleHandler>,
        metrics: Arc<MetricsCollector>,
        event_channel: impl Into<String>,
        unresponsive_threshold: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            notifier,
            lifecycle,
            metrics,
            event_channel: event_channel.into(),
            unresponsive_threshold,
        }
    }

    /// 执行一次健康检查
    pub async fn check(&self, now: DateTime<Utc>) -> SchedulerResult<HealthReport> {
        let started = Instant::now();
        let mut report = HealthReport::default();

        self.check_workers(now, &mut report).await?;
        self.check_worker_pools(now, &mut report).await?;

        self.metrics
            .record_health_check_duration(started.elapsed().as_secs_f64());
        Ok(report)
    }

    async fn check_workers(&self, now: DateTime<Utc>, report: &mut HealthReport) -> SchedulerResult<()> {
        debug!("开始检测无响应的Worker");

        let mut tx = self.store.begin().await?;
        let workers = tx.list_workers().await?;
        tx.commit().await?;

        let unresponsive: Vec<Worker> = workers
            .into_iter()
            .filter(|worker| {
                worker.enqueue_is_enabled && !worker.is_responsive(now, self.unresponsive_threshold)
            })
            .collect();
        self.metrics
            .update_unresponsive_workers(unresponsive.len() as f64);

        for worker in unresponsive {
            StructuredLogger::log_worker_unresponsive(&worker.api_key, worker.ping_response_dts);
            report.unresponsive_workers.push(worker.api_key.clone());

            // 每个Worker使用独立事务，失败时回滚，下次检查重试
            match self.fail_worker_runs(&worker, now).await {
                Ok(run_ids) => report.failed_run_ids.extend(run_ids),
                Err(e) => error!("标记Worker {} 的运行实例失败时出错: {}", worker.api_key, e),
            }
        }

        Ok(())
    }

    /// 强制失败Worker上所有未返回的运行实例，返回受影响的运行实例ID
    pub async fn fail_worker_runs(&self, worker: &Worker, now: DateTime<Utc>) -> SchedulerResult<Vec<i64>> {
        let mut tx = self.store.begin().await?;
        let candidates = tx.get_unreturned_runs_for_worker(worker.id).await?;
        let mut run_ids = Vec::with_capacity(candidates.len());
        let mut outcome = LifecycleOutcome::default();

        for candidate in candidates {
            // 与完成回调相同的加锁顺序：先作业后运行实例
            if tx.lock_job(candidate.job_id).await?.is_none() {
                continue;
            }
            let Some(mut run) = tx.lock_run(candidate.id).await? else {
                continue;
            };
            if run.worker_id != Some(worker.id) || !run.mark_failed(now) {
                continue;
            }
            tx.update_run(&run).await?;
            tx.save_run_log(&RunLog {
                run_id: run.id,
                content: UNRESPONSIVE_WORKER_LOG.to_string(),
            })
            .await?;

            StructuredLogger::log_run_forced_failed(run.id, &worker.api_key);
            self.metrics.record_run_forced_failed();

            outcome.merge(self.lifecycle.on_run_returned(tx.as_mut(), &run, now).await?);
            run_ids.push(run.id);
        }

        tx.commit().await?;

        let mut events = Vec::with_capacity(run_ids.len());
        for run_id in &run_ids {
            events.push(OutboundMessage {
                channel: self.event_channel.clone(),
                payload: RunEvent::returned(*run_id).to_bytes()?,
            });
        }
        publish_all(self.publisher.as_ref(), &self.metrics, events).await;
        deliver(self.notifier.as_ref(), &outcome.notifications).await;

        if !run_ids.is_empty() {
            info!(
                "Worker {} 无响应，{} 个运行实例已标记为失败",
                worker.api_key,
                run_ids.len()
            );
        }

        Ok(run_ids)
    }

    async fn check_worker_pools(&self, now: DateTime<Utc>, report: &mut HealthReport) -> SchedulerResult<()> {
        debug!("开始检测无响应的Worker池");

        let mut tx = self.store.begin().await?;
        let pools = tx.list_enabled_worker_pools().await?;
        let mut notifications: Vec<Notification> = Vec::new();

        for pool in pools {
            let workers = tx.get_enabled_pool_workers(pool.id).await?;
            if workers.is_empty() {
                continue;
            }

            let any_responsive = workers
                .iter()
                .any(|worker| worker.is_responsive(now, self.unresponsive_threshold));
            if any_responsive {
                continue;
            }

            StructuredLogger::log_pool_unresponsive(pool.id, &pool.title);
            let worker_keys: Vec<String> = workers.iter().map(|w| w.api_key.clone()).collect();
            notifications.push(
                self.lifecycle
                    .notification_settings()
                    .worker_pool_unresponsive(&pool, &worker_keys),
            );
            report.unresponsive_pool_ids.push(pool.id);
        }

        tx.commit().await?;

        self.metrics
            .update_unresponsive_pools(report.unresponsive_pool_ids.len() as f64);
        deliver(self.notifier.as_ref(), &notifications).await;
        Ok(())
    }
}
