//! 内存存储测试夹具
//!
//! 预先创建一个Worker池、一个使用该池的项目和一个模板，
//! 作业、Worker和运行实例通过辅助方法逐个添加。

use std::sync::Arc;

use jobrunner_core::{
    models::{
        Job, JobTemplate, KillRequest, Project, RescheduleExclude, Run, RunLog, Worker,
        WorkerPool,
    },
    traits::Store,
    SchedulerResult,
};
use jobrunner_infrastructure::InMemoryStore;

use crate::builders::JobBuilder;

pub struct Fixture {
    pub store: InMemoryStore,
    pub pool: WorkerPool,
    pub project: Project,
    pub template: JobTemplate,
}

impl Fixture {
    pub async fn new() -> SchedulerResult<Self> {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await?;

        let mut pool = WorkerPool::new("default-pool");
        pool.notification_addresses = "pool@example.com".to_string();
        let pool = tx.create_worker_pool(&pool).await?;

        let project = tx
            .create_project(&Project {
                id: 0,
                title: "default-project".to_string(),
                enqueue_is_enabled: true,
                notification_addresses: "project@example.com".to_string(),
                worker_pool_ids: vec![pool.id],
            })
            .await?;
        let template = tx
            .create_job_template(&JobTemplate {
                id: 0,
                title: "default-template".to_string(),
                project_id: project.id,
                enqueue_is_enabled: true,
                notification_addresses: String::new(),
            })
            .await?;
        tx.commit().await?;

        Ok(Self {
            store,
            pool,
            project,
            template,
        })
    }

    pub fn store(&self) -> Arc<dyn Store> {
        Arc::new(self.store.clone())
    }

    /// 使用夹具模板和Worker池的作业构建器
    pub fn job(&self) -> JobBuilder {
        JobBuilder::new(self.template.id, self.pool.id)
    }

    pub async fn add_job(&self, job: Job) -> SchedulerResult<Job> {
        let mut tx = self.store.begin().await?;
        let job = tx.create_job(&job).await?;
        tx.commit().await?;
        Ok(job)
    }

    /// 添加Worker并加入夹具Worker池
    pub async fn add_worker(&self, worker: Worker) -> SchedulerResult<Worker> {
        let mut tx = self.store.begin().await?;
        let worker = tx.create_worker(&worker).await?;
        tx.add_worker_to_pool(worker.id, self.pool.id).await?;
        tx.commit().await?;
        Ok(worker)
    }

    /// 添加不属于任何项目的Worker池
    pub async fn add_pool(&self, title: &str) -> SchedulerResult<WorkerPool> {
        let mut tx = self.store.begin().await?;
        let pool = tx.create_worker_pool(&WorkerPool::new(title)).await?;
        tx.commit().await?;
        Ok(pool)
    }

    pub async fn add_run(&self, run: Run) -> SchedulerResult<Run> {
        let mut tx = self.store.begin().await?;
        let run = tx.create_run(&run).await?;
        tx.commit().await?;
        Ok(run)
    }

    pub async fn add_exclude(&self, exclude: RescheduleExclude) -> SchedulerResult<RescheduleExclude> {
        let mut tx = self.store.begin().await?;
        let exclude = tx.create_reschedule_exclude(&exclude).await?;
        tx.commit().await?;
        Ok(exclude)
    }

    pub async fn add_kill_request(&self, kill_request: KillRequest) -> SchedulerResult<KillRequest> {
        let mut tx = self.store.begin().await?;
        let kill_request = tx.create_kill_request(&kill_request).await?;
        tx.commit().await?;
        Ok(kill_request)
    }

    pub async fn job_by_id(&self, id: i64) -> SchedulerResult<Option<Job>> {
        let mut tx = self.store.begin().await?;
        let job = tx.get_job(id).await?;
        tx.rollback().await?;
        Ok(job)
    }

    pub async fn update_job(&self, job: &Job) -> SchedulerResult<()> {
        let mut tx = self.store.begin().await?;
        tx.update_job(job).await?;
        tx.commit().await
    }

    pub async fn run_by_id(&self, id: i64) -> SchedulerResult<Option<Run>> {
        let mut tx = self.store.begin().await?;
        let run = tx.get_run(id).await?;
        tx.rollback().await?;
        Ok(run)
    }

    pub async fn update_run(&self, run: &Run) -> SchedulerResult<()> {
        let mut tx = self.store.begin().await?;
        tx.update_run(run).await?;
        tx.commit().await
    }

    pub async fn runs_of_job(&self, job_id: i64) -> SchedulerResult<Vec<Run>> {
        let mut tx = self.store.begin().await?;
        let runs = tx.get_job_runs(job_id).await?;
        tx.rollback().await?;
        Ok(runs)
    }

    pub async fn run_log(&self, run_id: i64) -> SchedulerResult<Option<RunLog>> {
        let mut tx = self.store.begin().await?;
        let log = tx.get_run_log(run_id).await?;
        tx.rollback().await?;
        Ok(log)
    }

    pub async fn worker_by_key(&self, api_key: &str) -> SchedulerResult<Option<Worker>> {
        let mut tx = self.store.begin().await?;
        let worker = tx.get_worker_by_api_key(api_key).await?;
        tx.rollback().await?;
        Ok(worker)
    }
}
