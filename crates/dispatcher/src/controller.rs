//! 作业和运行实例的操作入口
//!
//! 包括运维操作（创建作业、手动运行、终止运行）和Worker回调
//! （运行状态更新、ping响应、终止请求确认）。每个操作使用一个事务，
//! 通知在提交后发送。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use jobrunner_core::{
    models::{Job, KillRequest, KillRequestUpdate, PingResponse, Run, RunLog, RunUpdate, Worker},
    traits::{Notifier, Store, StoreTransaction},
    SchedulerError, SchedulerResult,
};
use jobrunner_infrastructure::StructuredLogger;

use crate::lifecycle::{LifecycleOutcome, RunLifecycleHandler};
use crate::notifications::deliver;

pub struct JobController {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    lifecycle: Arc<RunLifecycleHandler>,
}

impl JobController {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        lifecycle: Arc<RunLifecycleHandler>,
    ) -> Self {
        Self {
            store,
            notifier,
            lifecycle,
        }
    }

    // ---- 作业定义 ----

    /// 校验后创建作业
    pub async fn create_job(&self, job: &Job) -> SchedulerResult<Job> {
        let mut tx = self.store.begin().await?;
        validate_job(tx.as_mut(), job).await?;
        let created = tx.create_job(job).await?;
        tx.commit().await?;

        info!("创建作业 {} ({})", created.title, created.id);
        Ok(created)
    }

    /// 校验后更新作业定义
    pub async fn update_job(&self, job: &Job) -> SchedulerResult<()> {
        let mut tx = self.store.begin().await?;
        if tx.lock_job(job.id).await?.is_none() {
            return Err(SchedulerError::JobNotFound { id: job.id });
        }
        validate_job(tx.as_mut(), job).await?;
        tx.update_job(job).await?;
        tx.commit().await
    }

    // ---- 调度 ----

    /// 在指定时间调度作业，已有到期未完成的运行实例时返回 `None`
    pub async fn schedule(&self, job_id: i64, dts: DateTime<Utc>) -> SchedulerResult<Option<Run>> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        ensure_job_exists(tx.as_mut(), job_id).await?;
        let run = self
            .lifecycle
            .engine()
            .schedule(tx.as_mut(), job_id, dts, now)
            .await?;
        tx.commit().await?;
        Ok(run)
    }

    pub async fn schedule_now(&self, job_id: i64) -> SchedulerResult<Option<Run>> {
        self.schedule(job_id, Utc::now()).await
    }

    /// 立即手动运行作业，不受入队开关限制
    pub async fn schedule_manual(&self, job_id: i64, schedule_children: bool) -> SchedulerResult<Run> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        ensure_job_exists(tx.as_mut(), job_id).await?;
        let run = self
            .lifecycle
            .engine()
            .schedule_manual(tx.as_mut(), job_id, schedule_children, now)
            .await?;
        tx.commit().await?;
        Ok(run)
    }

    // ---- Worker回调 ----

    /// Worker上报运行实例状态
    ///
    /// 已返回的运行实例不再变化；字段只能从空变为有值。
    /// 本次更新使运行实例返回时，在同一事务内执行返回处理。
    pub async fn complete_run(
        &self,
        run_id: i64,
        worker_key: &str,
        update: &RunUpdate,
    ) -> SchedulerResult<Run> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let worker = find_worker(tx.as_mut(), worker_key).await?;

        // 先锁作业再锁运行实例
        let job_id = tx
            .get_run(run_id)
            .await?
            .ok_or(SchedulerError::RunNotFound { id: run_id })?
            .job_id;
        let job = tx
            .lock_job(job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound { id: job_id })?;
        let mut run = tx
            .lock_run(run_id)
            .await?
            .ok_or(SchedulerError::RunNotFound { id: run_id })?;

        if run.is_returned() {
            debug!("运行实例 {} 已返回，忽略更新", run_id);
            tx.rollback().await?;
            return Ok(run);
        }

        match run.worker_id {
            Some(assigned) if assigned != worker.id => {
                return Err(SchedulerError::WorkerMismatch {
                    worker: worker.api_key,
                    run_id,
                });
            }
            Some(_) => {}
            None => {
                if !tx.is_pool_member(worker.id, job.worker_pool_id).await? {
                    return Err(SchedulerError::WorkerMismatch {
                        worker: worker.api_key,
                        run_id,
                    });
                }
                run.worker_id = Some(worker.id);
            }
        }

        let returned = run.apply_update(update)?;
        tx.update_run(&run).await?;

        if let Some(content) = &update.log {
            tx.save_run_log(&RunLog {
                run_id,
                content: content.clone(),
            })
            .await?;
        }

        let outcome = if returned {
            self.lifecycle.on_run_returned(tx.as_mut(), &run, now).await?
        } else {
            LifecycleOutcome::default()
        };

        tx.commit().await?;
        deliver(self.notifier.as_ref(), &outcome.notifications).await;

        Ok(run)
    }

    /// 记录Worker的ping响应
    pub async fn record_ping_response(
        &self,
        worker_key: &str,
        response: &PingResponse,
    ) -> SchedulerResult<Worker> {
        let mut tx = self.store.begin().await?;
        let mut worker = find_worker(tx.as_mut(), worker_key).await?;
        worker.record_ping_response(response, Utc::now());
        tx.update_worker(&worker).await?;
        tx.commit().await?;

        StructuredLogger::log_ping_response(
            &worker.api_key,
            worker.worker_version.as_deref(),
            worker.concurrent_jobs,
        );
        Ok(worker)
    }

    // ---- 终止请求 ----

    /// 为尚未返回的运行实例创建终止请求
    pub async fn request_kill(&self, run_id: i64) -> SchedulerResult<KillRequest> {
        let mut tx = self.store.begin().await?;
        let run = tx
            .lock_run(run_id)
            .await?
            .ok_or(SchedulerError::RunNotFound { id: run_id })?;

        if run.is_returned() {
            return Err(SchedulerError::InvalidRunUpdate(format!(
                "运行实例 {run_id} 已返回，无法终止"
            )));
        }

        let kill_request = tx
            .create_kill_request(&KillRequest::new(run_id, Utc::now()))
            .await?;
        tx.commit().await?;

        info!("为运行实例 {} 创建终止请求 {}", run_id, kill_request.id);
        Ok(kill_request)
    }

    /// Worker确认终止请求，字段只能从空变为有值
    pub async fn update_kill_request(
        &self,
        kill_request_id: i64,
        worker_key: &str,
        update: &KillRequestUpdate,
    ) -> SchedulerResult<KillRequest> {
        let mut tx = self.store.begin().await?;
        let worker = find_worker(tx.as_mut(), worker_key).await?;

        let mut kill_request = tx
            .lock_kill_request(kill_request_id)
            .await?
            .ok_or(SchedulerError::KillRequestNotFound { id: kill_request_id })?;
        let run = tx
            .get_run(kill_request.run_id)
            .await?
            .ok_or(SchedulerError::RunNotFound {
                id: kill_request.run_id,
            })?;

        if run.worker_id != Some(worker.id) {
            return Err(SchedulerError::WorkerMismatch {
                worker: worker.api_key,
                run_id: run.id,
            });
        }

        if kill_request.enqueue_dts.is_none() {
            kill_request.enqueue_dts = update.enqueue_dts;
        }
        if kill_request.execute_dts.is_none() {
            kill_request.execute_dts = update.execute_dts;
        }

        tx.update_kill_request(&kill_request).await?;
        tx.commit().await?;
        Ok(kill_request)
    }
}

async fn find_worker(tx: &mut dyn StoreTransaction, api_key: &str) -> SchedulerResult<Worker> {
    tx.get_worker_by_api_key(api_key)
        .await?
        .ok_or_else(|| SchedulerError::WorkerNotFound {
            key: api_key.to_string(),
        })
}

async fn ensure_job_exists(tx: &mut dyn StoreTransaction, job_id: i64) -> SchedulerResult<()> {
    match tx.get_job(job_id).await? {
        Some(_) => Ok(()),
        None => Err(SchedulerError::JobNotFound { id: job_id }),
    }
}

/// 校验作业定义
///
/// - 标题不能为空，重新调度间隔必须为正
/// - Worker池必须属于模板所在的项目
/// - 父作业链不能成环
pub async fn validate_job(tx: &mut dyn StoreTransaction, job: &Job) -> SchedulerResult<()> {
    if job.title.trim().is_empty() {
        return Err(SchedulerError::InvalidJob("作业标题不能为空".to_string()));
    }

    if let Some(interval) = job.reschedule_interval {
        if interval <= 0 {
            return Err(SchedulerError::InvalidJob(format!(
                "重新调度间隔必须为正数: {interval}"
            )));
        }
    }

    let template = tx
        .get_job_template(job.job_template_id)
        .await?
        .ok_or_else(|| {
            SchedulerError::InvalidJob(format!("作业模板 {} 不存在", job.job_template_id))
        })?;
    let project = tx
        .get_project(template.project_id)
        .await?
        .ok_or_else(|| SchedulerError::InvalidJob(format!("项目 {} 不存在", template.project_id)))?;

    if !project.worker_pool_ids.contains(&job.worker_pool_id) {
        return Err(SchedulerError::InvalidJob(format!(
            "Worker池 {} 不属于项目 {}",
            job.worker_pool_id, project.title
        )));
    }

    let mut visited = HashSet::new();
    let mut parent_id = job.parent_id;
    while let Some(id) = parent_id {
        if id == job.id || !visited.insert(id) {
            warn!("作业 {} 的父作业链存在循环", job.id);
            return Err(SchedulerError::CircularDependency { job_id: job.id });
        }

        let parent = tx
            .get_job(id)
            .await?
            .ok_or_else(|| SchedulerError::InvalidJob(format!("父作业 {id} 不存在")))?;
        parent_id = parent.parent_id;
    }

    Ok(())
}
