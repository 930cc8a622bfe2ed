//! 存储层接口定义
//!
//! 所有读写都在一个事务内完成。带 `lock_` 前缀的方法是加锁读取
//! （PostgreSQL 中为 `SELECT ... FOR UPDATE`），锁在事务提交或回滚时释放。
//!
//! 加锁顺序：先锁作业行，再锁该作业的运行实例行。修改 `return_dts`
//! 的事务都必须持有作业行锁。
//!
//! ## 实现
//! - PostgreSQL：基于 sqlx 的行锁
//! - 内存存储：串行化事务，回滚时丢弃改动

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::{
        Job, JobContext, JobTemplate, KillRequest, Project, RescheduleExclude, Run, RunLog,
        Worker, WorkerPool,
    },
    SchedulerResult,
};

/// 存储入口，负责开启事务
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> SchedulerResult<Box<dyn StoreTransaction>>;
}

/// 存储事务
#[async_trait]
pub trait StoreTransaction: Send {
    async fn commit(self: Box<Self>) -> SchedulerResult<()>;

    async fn rollback(self: Box<Self>) -> SchedulerResult<()>;

    // ---- 项目 / 模板 / Worker池 ----

    async fn create_project(&mut self, project: &Project) -> SchedulerResult<Project>;

    async fn get_project(&mut self, id: i64) -> SchedulerResult<Option<Project>>;

    async fn create_job_template(&mut self, template: &JobTemplate)
        -> SchedulerResult<JobTemplate>;

    async fn get_job_template(&mut self, id: i64) -> SchedulerResult<Option<JobTemplate>>;

    async fn create_worker_pool(&mut self, pool: &WorkerPool) -> SchedulerResult<WorkerPool>;

    async fn get_worker_pool(&mut self, id: i64) -> SchedulerResult<Option<WorkerPool>>;

    async fn list_enabled_worker_pools(&mut self) -> SchedulerResult<Vec<WorkerPool>>;

    // ---- 作业 ----

    async fn create_job(&mut self, job: &Job) -> SchedulerResult<Job>;

    async fn get_job(&mut self, id: i64) -> SchedulerResult<Option<Job>>;

    /// 加锁读取作业行，同一批次的并发完成在此串行化
    async fn lock_job(&mut self, id: i64) -> SchedulerResult<Option<Job>>;

    async fn update_job(&mut self, job: &Job) -> SchedulerResult<()>;

    async fn get_child_jobs(&mut self, parent_id: i64) -> SchedulerResult<Vec<Job>>;

    /// 作业及其模板、项目、Worker池
    async fn get_job_context(&mut self, job_id: i64) -> SchedulerResult<Option<JobContext>>;

    async fn create_reschedule_exclude(
        &mut self,
        exclude: &RescheduleExclude,
    ) -> SchedulerResult<RescheduleExclude>;

    async fn get_reschedule_excludes(
        &mut self,
        job_id: i64,
    ) -> SchedulerResult<Vec<RescheduleExclude>>;

    // ---- 运行实例 ----

    /// 创建运行实例。`schedule_id` 为0时使用新生成的ID
    async fn create_run(&mut self, run: &Run) -> SchedulerResult<Run>;

    async fn get_run(&mut self, id: i64) -> SchedulerResult<Option<Run>>;

    async fn lock_run(&mut self, id: i64) -> SchedulerResult<Option<Run>>;

    async fn update_run(&mut self, run: &Run) -> SchedulerResult<()>;

    async fn delete_run(&mut self, id: i64) -> SchedulerResult<()>;

    /// 加锁读取可分发的运行实例，按计划时间和ID排序，跳过已被其他事务锁定的行
    async fn lock_enqueueable_runs(&mut self, now: DateTime<Utc>) -> SchedulerResult<Vec<Run>>;

    /// 加锁读取同批次中除指定实例外尚未返回的运行实例
    async fn lock_unfinished_batch_runs(
        &mut self,
        schedule_id: i64,
        exclude_run_id: i64,
    ) -> SchedulerResult<Vec<Run>>;

    async fn get_batch_runs(&mut self, schedule_id: i64) -> SchedulerResult<Vec<Run>>;

    /// 作业的全部运行实例，按ID排序
    async fn get_job_runs(&mut self, job_id: i64) -> SchedulerResult<Vec<Run>>;

    /// 作业是否存在尚未返回的运行实例
    async fn has_unfinished_runs(&mut self, job_id: i64) -> SchedulerResult<bool>;

    /// 作业最近一次（ID最大）非手动运行实例
    async fn get_last_scheduled_run(&mut self, job_id: i64) -> SchedulerResult<Option<Run>>;

    /// 作业是否已有到期、未返回的非手动运行实例
    async fn has_due_pending_run(
        &mut self,
        job_id: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<bool>;

    /// 分配给Worker且尚未返回的运行实例，按作业ID和运行实例ID排序
    ///
    /// 不加锁，调用方需先锁作业再用 `lock_run` 锁运行实例并重新检查状态。
    async fn get_unreturned_runs_for_worker(
        &mut self,
        worker_id: i64,
    ) -> SchedulerResult<Vec<Run>>;

    async fn save_run_log(&mut self, log: &RunLog) -> SchedulerResult<()>;

    async fn get_run_log(&mut self, run_id: i64) -> SchedulerResult<Option<RunLog>>;

    // ---- 终止请求 ----

    async fn create_kill_request(
        &mut self,
        kill_request: &KillRequest,
    ) -> SchedulerResult<KillRequest>;

    async fn lock_kill_request(&mut self, id: i64) -> SchedulerResult<Option<KillRequest>>;

    async fn update_kill_request(&mut self, kill_request: &KillRequest) -> SchedulerResult<()>;

    /// 可以发送给Worker的终止请求
    async fn get_killable_kill_requests(&mut self) -> SchedulerResult<Vec<KillRequest>>;

    // ---- Worker ----

    async fn create_worker(&mut self, worker: &Worker) -> SchedulerResult<Worker>;

    async fn get_worker(&mut self, id: i64) -> SchedulerResult<Option<Worker>>;

    async fn get_worker_by_api_key(&mut self, api_key: &str) -> SchedulerResult<Option<Worker>>;

    async fn update_worker(&mut self, worker: &Worker) -> SchedulerResult<()>;

    async fn list_workers(&mut self) -> SchedulerResult<Vec<Worker>>;

    async fn add_worker_to_pool(&mut self, worker_id: i64, pool_id: i64) -> SchedulerResult<()>;

    /// Worker池中允许入队的Worker，按ID排序
    async fn get_enabled_pool_workers(&mut self, pool_id: i64) -> SchedulerResult<Vec<Worker>>;

    async fn is_pool_member(&mut self, worker_id: i64, pool_id: i64) -> SchedulerResult<bool>;
}
