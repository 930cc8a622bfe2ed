//! 分发广播
//!
//! 每次扫描在一个事务内加锁读取可分发的运行实例并确定目标Worker，
//! 事务提交后才把消息发布到 `<channel_prefix>.<api_key>` 频道。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use jobrunner_core::{
    models::{worker_channel, DispatchMessage, Job, OutboundMessage, Run, Worker},
    traits::{MessagePublisher, Store, StoreTransaction},
    SchedulerResult,
};
use jobrunner_infrastructure::{MetricsCollector, StructuredLogger};

use crate::strategies::WorkerSelectionStrategy;

/// 一次扫描的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub runs_dispatched: usize,
    pub kill_requests_dispatched: usize,
    pub pings_sent: usize,
}

pub struct DispatchBroadcaster {
    store: Arc<dyn Store>,
    publisher: Arc<dyn MessagePublisher>,
    strategy: Arc<dyn WorkerSelectionStrategy>,
    metrics: Arc<MetricsCollector>,
    channel_prefix: String,
}

impl DispatchBroadcaster {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn MessagePublisher>,
        strategy: Arc<dyn WorkerSelectionStrategy>,
        metrics: Arc<MetricsCollector>,
        channel_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            strategy,
            metrics,
            channel_prefix: channel_prefix.into(),
        }
    }

    /// 执行一次完整扫描：运行实例、终止请求，以及按需发送ping
    pub async fn sweep(&self, now: DateTime<Utc>, send_pings: bool) -> SchedulerResult<SweepSummary> {
        let started = Instant::now();
        let mut summary = SweepSummary::default();

        if send_pings {
            summary.pings_sent = self.broadcast_pings().await?;
        }
        summary.runs_dispatched = self.broadcast_runs(now).await?;
        summary.kill_requests_dispatched = self.broadcast_kill_requests().await?;

        self.metrics
            .record_dispatch_sweep_duration(started.elapsed().as_secs_f64());

        if summary.runs_dispatched > 0 || summary.kill_requests_dispatched > 0 {
            info!(
                "本次扫描分发了 {} 个运行实例和 {} 个终止请求",
                summary.runs_dispatched, summary.kill_requests_dispatched
            );
        }
        Ok(summary)
    }

    /// 分发到期的运行实例，返回发出的enqueue消息数
    pub async fn broadcast_runs(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let mut tx = self.store.begin().await?;
        let runs = tx.lock_enqueueable_runs(now).await?;
        if runs.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        debug!("找到 {} 个可分发的运行实例", runs.len());

        // 每个作业在一次扫描中只处理第一个分发的批次
        let mut dispatched_jobs: HashMap<i64, i64> = HashMap::new();
        let mut outbound = Vec::new();

        for run in runs {
            if let Some(schedule_id) = dispatched_jobs.get(&run.job_id) {
                if *schedule_id != run.schedule_id {
                    continue;
                }
            }

            let Some(job) = tx.get_job(run.job_id).await? else {
                warn!("运行实例 {} 所属的作业 {} 不存在", run.id, run.job_id);
                continue;
            };

            for (target_run, worker) in self.resolve_targets(tx.as_mut(), &job, run).await? {
                StructuredLogger::log_run_dispatched(
                    target_run.id,
                    job.id,
                    target_run.schedule_id,
                    &worker.api_key,
                );
                dispatched_jobs.insert(job.id, target_run.schedule_id);
                outbound.push(OutboundMessage {
                    channel: worker_channel(&self.channel_prefix, &worker.api_key),
                    payload: DispatchMessage::enqueue(target_run.id).to_bytes()?,
                });
            }
        }

        tx.commit().await?;

        let count = outbound.len();
        self.publish_all(outbound).await;
        self.metrics.record_runs_dispatched(count as u64);
        Ok(count)
    }

    /// 确定运行实例的目标Worker
    ///
    /// 已指定Worker时直接使用；作业要求在所有Worker上运行时为每个Worker创建同批次的
    /// 运行实例并删除占位实例；否则随机选择一个Worker并记录到运行实例上。
    async fn resolve_targets(
        &self,
        tx: &mut dyn StoreTransaction,
        job: &Job,
        mut run: Run,
    ) -> SchedulerResult<Vec<(Run, Worker)>> {
        if let Some(worker_id) = run.worker_id {
            return match tx.get_worker(worker_id).await? {
                Some(worker) => Ok(vec![(run, worker)]),
                None => {
                    warn!("运行实例 {} 指定的Worker {} 不存在", run.id, worker_id);
                    Ok(Vec::new())
                }
            };
        }

        let workers = tx.get_enabled_pool_workers(job.worker_pool_id).await?;
        if workers.is_empty() {
            StructuredLogger::log_no_worker_available(run.id, job.id, job.worker_pool_id);
            return Ok(Vec::new());
        }

        if job.run_on_all_workers {
            return self.fan_out(tx, run, workers).await;
        }

        let Some(worker) = self.strategy.select_worker(&workers).cloned() else {
            return Ok(Vec::new());
        };
        run.worker_id = Some(worker.id);
        tx.update_run(&run).await?;

        Ok(vec![(run, worker)])
    }

    async fn fan_out(
        &self,
        tx: &mut dyn StoreTransaction,
        placeholder: Run,
        workers: Vec<Worker>,
    ) -> SchedulerResult<Vec<(Run, Worker)>> {
        let mut targets = Vec::with_capacity(workers.len());
        let mut schedule_id = 0;

        for worker in workers {
            let mut run = Run::new(placeholder.job_id, placeholder.schedule_dts);
            run.schedule_id = schedule_id;
            run.worker_id = Some(worker.id);
            run.is_manual = placeholder.is_manual;
            run.schedule_children = placeholder.schedule_children;

            let run = tx.create_run(&run).await?;
            schedule_id = run.schedule_id;
            targets.push((run, worker));
        }

        tx.delete_run(placeholder.id).await?;
        StructuredLogger::log_run_fanned_out(placeholder.job_id, schedule_id, targets.len());

        Ok(targets)
    }

    /// 分发终止请求，返回发出的kill消息数
    pub async fn broadcast_kill_requests(&self) -> SchedulerResult<usize> {
        let mut tx = self.store.begin().await?;
        let kill_requests = tx.get_killable_kill_requests().await?;
        let mut outbound = Vec::with_capacity(kill_requests.len());

        for kill_request in kill_requests {
            let Some(run) = tx.get_run(kill_request.run_id).await? else {
                continue;
            };
            let Some(worker_id) = run.worker_id else {
                continue;
            };
            let Some(worker) = tx.get_worker(worker_id).await? else {
                warn!("终止请求 {} 的Worker {} 不存在", kill_request.id, worker_id);
                continue;
            };

            StructuredLogger::log_kill_request_dispatched(kill_request.id, run.id, &worker.api_key);
            outbound.push(OutboundMessage {
                channel: worker_channel(&self.channel_prefix, &worker.api_key),
                payload: DispatchMessage::kill(kill_request.id).to_bytes()?,
            });
        }

        tx.commit().await?;

        let count = outbound.len();
        self.publish_all(outbound).await;
        self.metrics.record_kill_requests_dispatched(count as u64);
        Ok(count)
    }

    /// 向所有Worker发送ping
    pub async fn broadcast_pings(&self) -> SchedulerResult<usize> {
        let mut tx = self.store.begin().await?;
        let workers = tx.list_workers().await?;
        tx.commit().await?;

        let payload = DispatchMessage::Ping.to_bytes()?;
        let outbound: Vec<OutboundMessage> = workers
            .iter()
            .map(|worker| OutboundMessage {
                channel: worker_channel(&self.channel_prefix, &worker.api_key),
                payload: payload.clone(),
            })
            .collect();

        let count = outbound.len();
        debug!("向 {} 个Worker发送ping", count);
        self.publish_all(outbound).await;
        self.metrics.record_pings_sent(count as u64);
        Ok(count)
    }

    async fn publish_all(&self, messages: Vec<OutboundMessage>) {
        publish_all(self.publisher.as_ref(), &self.metrics, messages).await;
    }
}

/// 发布事务提交后积累的消息，单条失败不影响其余消息
pub(crate) async fn publish_all(
    publisher: &dyn MessagePublisher,
    metrics: &MetricsCollector,
    messages: Vec<OutboundMessage>,
) {
    for message in messages {
        if let Err(e) = publisher.publish(&message.channel, &message.payload).await {
            error!("发布消息到频道 {} 失败: {}", message.channel, e);
            metrics.record_publish_failure();
        }
    }
}
