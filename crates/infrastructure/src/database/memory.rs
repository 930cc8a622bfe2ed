//! 内存存储
//!
//! 事务持有整个状态的互斥锁，在工作副本上修改，提交时写回，回滚或丢弃时放弃改动。
//! 事务因此是串行化的，加锁读取与普通读取没有区别。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobrunner_core::{
    eligibility::{is_kill_request_killable, is_run_enqueueable},
    models::{
        Job, JobContext, JobTemplate, KillRequest, Project, RescheduleExclude, Run, RunLog,
        Worker, WorkerPool,
    },
    traits::{Store, StoreTransaction},
    SchedulerError, SchedulerResult,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Sequences {
    project: i64,
    template: i64,
    pool: i64,
    job: i64,
    exclude: i64,
    run: i64,
    kill_request: i64,
    worker: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    sequences: Sequences,
    projects: BTreeMap<i64, Project>,
    templates: BTreeMap<i64, JobTemplate>,
    pools: BTreeMap<i64, WorkerPool>,
    /// (pool_id, worker_id)
    pool_members: BTreeSet<(i64, i64)>,
    jobs: BTreeMap<i64, Job>,
    excludes: BTreeMap<i64, RescheduleExclude>,
    runs: BTreeMap<i64, Run>,
    run_logs: HashMap<i64, RunLog>,
    kill_requests: BTreeMap<i64, KillRequest>,
    workers: BTreeMap<i64, Worker>,
}

impl MemoryState {
    fn job_context(&self, job_id: i64) -> SchedulerResult<Option<JobContext>> {
        let Some(job) = self.jobs.get(&job_id) else {
            return Ok(None);
        };
        let template = self.templates.get(&job.job_template_id).ok_or_else(|| {
            SchedulerError::DatabaseOperation(format!(
                "作业 {} 的模板 {} 不存在",
                job.id, job.job_template_id
            ))
        })?;
        let project = self.projects.get(&template.project_id).ok_or_else(|| {
            SchedulerError::DatabaseOperation(format!(
                "模板 {} 的项目 {} 不存在",
                template.id, template.project_id
            ))
        })?;
        let pool = self.pools.get(&job.worker_pool_id).ok_or_else(|| {
            SchedulerError::DatabaseOperation(format!(
                "作业 {} 的Worker池 {} 不存在",
                job.id, job.worker_pool_id
            ))
        })?;

        Ok(Some(JobContext {
            job: job.clone(),
            template: template.clone(),
            project: project.clone(),
            pool: pool.clone(),
        }))
    }

    fn runs_of_job(&self, job_id: i64) -> Vec<Run> {
        self.runs
            .values()
            .filter(|run| run.job_id == job_id)
            .cloned()
            .collect()
    }
}

/// 内存存储，用于嵌入式运行和测试
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> SchedulerResult<Box<dyn StoreTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }
}

/// 内存事务
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> SchedulerResult<()> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SchedulerResult<()> {
        Ok(())
    }

    async fn create_project(&mut self, project: &Project) -> SchedulerResult<Project> {
        let id = next_id(&mut self.working.sequences.project);
        let created = Project {
            id,
            ..project.clone()
        };
        self.working.projects.insert(id, created.clone());
        Ok(created)
    }

    async fn get_project(&mut self, id: i64) -> SchedulerResult<Option<Project>> {
        Ok(self.working.projects.get(&id).cloned())
    }

    async fn create_job_template(
        &mut self,
        template: &JobTemplate,
    ) -> SchedulerResult<JobTemplate> {
        let id = next_id(&mut self.working.sequences.template);
        let created = JobTemplate {
            id,
            ..template.clone()
        };
        self.working.templates.insert(id, created.clone());
        Ok(created)
    }

    async fn get_job_template(&mut self, id: i64) -> SchedulerResult<Option<JobTemplate>> {
        Ok(self.working.templates.get(&id).cloned())
    }

    async fn create_worker_pool(&mut self, pool: &WorkerPool) -> SchedulerResult<WorkerPool> {
        let id = next_id(&mut self.working.sequences.pool);
        let created = WorkerPool { id, ..pool.clone() };
        self.working.pools.insert(id, created.clone());
        Ok(created)
    }

    async fn get_worker_pool(&mut self, id: i64) -> SchedulerResult<Option<WorkerPool>> {
        Ok(self.working.pools.get(&id).cloned())
    }

    async fn list_enabled_worker_pools(&mut self) -> SchedulerResult<Vec<WorkerPool>> {
        Ok(self
            .working
            .pools
            .values()
            .filter(|pool| pool.enqueue_is_enabled)
            .cloned()
            .collect())
    }

    async fn create_job(&mut self, job: &Job) -> SchedulerResult<Job> {
        let id = next_id(&mut self.working.sequences.job);
        let created = Job { id, ..job.clone() };
        self.working.jobs.insert(id, created.clone());
        Ok(created)
    }

    async fn get_job(&mut self, id: i64) -> SchedulerResult<Option<Job>> {
        Ok(self.working.jobs.get(&id).cloned())
    }

    async fn lock_job(&mut self, id: i64) -> SchedulerResult<Option<Job>> {
        self.get_job(id).await
    }

    async fn update_job(&mut self, job: &Job) -> SchedulerResult<()> {
        match self.working.jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(SchedulerError::JobNotFound { id: job.id }),
        }
    }

    async fn get_child_jobs(&mut self, parent_id: i64) -> SchedulerResult<Vec<Job>> {
        Ok(self
            .working
            .jobs
            .values()
            .filter(|job| job.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn get_job_context(&mut self, job_id: i64) -> SchedulerResult<Option<JobContext>> {
        self.working.job_context(job_id)
    }

    async fn create_reschedule_exclude(
        &mut self,
        exclude: &RescheduleExclude,
    ) -> SchedulerResult<RescheduleExclude> {
        let id = next_id(&mut self.working.sequences.exclude);
        let created = RescheduleExclude {
            id,
            ..exclude.clone()
        };
        self.working.excludes.insert(id, created.clone());
        Ok(created)
    }

    async fn get_reschedule_excludes(
        &mut self,
        job_id: i64,
    ) -> SchedulerResult<Vec<RescheduleExclude>> {
        let mut excludes: Vec<RescheduleExclude> = self
            .working
            .excludes
            .values()
            .filter(|exclude| exclude.job_id == job_id)
            .cloned()
            .collect();
        excludes.sort_by_key(|exclude| exclude.start_time);
        Ok(excludes)
    }

    async fn create_run(&mut self, run: &Run) -> SchedulerResult<Run> {
        let id = next_id(&mut self.working.sequences.run);
        let schedule_id = if run.schedule_id == 0 {
            id
        } else {
            run.schedule_id
        };
        let created = Run {
            id,
            schedule_id,
            ..run.clone()
        };
        self.working.runs.insert(id, created.clone());
        Ok(created)
    }

    async fn get_run(&mut self, id: i64) -> SchedulerResult<Option<Run>> {
        Ok(self.working.runs.get(&id).cloned())
    }

    async fn lock_run(&mut self, id: i64) -> SchedulerResult<Option<Run>> {
        self.get_run(id).await
    }

    async fn update_run(&mut self, run: &Run) -> SchedulerResult<()> {
        match self.working.runs.get_mut(&run.id) {
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => Err(SchedulerError::RunNotFound { id: run.id }),
        }
    }

    async fn delete_run(&mut self, id: i64) -> SchedulerResult<()> {
        self.working.runs.remove(&id);
        self.working.run_logs.remove(&id);
        self.working.kill_requests.retain(|_, kr| kr.run_id != id);
        Ok(())
    }

    async fn lock_enqueueable_runs(&mut self, now: DateTime<Utc>) -> SchedulerResult<Vec<Run>> {
        let mut contexts: HashMap<i64, (JobContext, Vec<Run>)> = HashMap::new();
        let mut eligible = Vec::new();

        for run in self.working.runs.values() {
            if run.schedule_dts > now || run.enqueue_dts.is_some() || run.return_dts.is_some() {
                continue;
            }

            if !contexts.contains_key(&run.job_id) {
                let Some(context) = self.working.job_context(run.job_id)? else {
                    continue;
                };
                contexts.insert(run.job_id, (context, self.working.runs_of_job(run.job_id)));
            }

            if let Some((context, job_runs)) = contexts.get(&run.job_id) {
                if is_run_enqueueable(run, context, job_runs, now) {
                    eligible.push(run.clone());
                }
            }
        }

        eligible.sort_by(|a, b| a.schedule_dts.cmp(&b.schedule_dts).then(a.id.cmp(&b.id)));
        Ok(eligible)
    }

    async fn lock_unfinished_batch_runs(
        &mut self,
        schedule_id: i64,
        exclude_run_id: i64,
    ) -> SchedulerResult<Vec<Run>> {
        Ok(self
            .working
            .runs
            .values()
            .filter(|run| {
                run.schedule_id == schedule_id && run.id != exclude_run_id && !run.is_returned()
            })
            .cloned()
            .collect())
    }

    async fn get_batch_runs(&mut self, schedule_id: i64) -> SchedulerResult<Vec<Run>> {
        Ok(self
            .working
            .runs
            .values()
            .filter(|run| run.schedule_id == schedule_id)
            .cloned()
            .collect())
    }

    async fn get_job_runs(&mut self, job_id: i64) -> SchedulerResult<Vec<Run>> {
        Ok(self.working.runs_of_job(job_id))
    }

    async fn has_unfinished_runs(&mut self, job_id: i64) -> SchedulerResult<bool> {
        Ok(self
            .working
            .runs
            .values()
            .any(|run| run.job_id == job_id && !run.is_returned()))
    }

    async fn get_last_scheduled_run(&mut self, job_id: i64) -> SchedulerResult<Option<Run>> {
        Ok(self
            .working
            .runs
            .values()
            .rev()
            .find(|run| run.job_id == job_id && !run.is_manual)
            .cloned())
    }

    async fn has_due_pending_run(
        &mut self,
        job_id: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        Ok(self.working.runs.values().any(|run| {
            run.job_id == job_id && !run.is_manual && !run.is_returned() && run.schedule_dts <= now
        }))
    }

    async fn get_unreturned_runs_for_worker(
        &mut self,
        worker_id: i64,
    ) -> SchedulerResult<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .working
            .runs
            .values()
            .filter(|run| run.worker_id == Some(worker_id) && !run.is_returned())
            .cloned()
            .collect();
        runs.sort_by_key(|run| (run.job_id, run.id));
        Ok(runs)
    }

    async fn save_run_log(&mut self, log: &RunLog) -> SchedulerResult<()> {
        self.working.run_logs.insert(log.run_id, log.clone());
        Ok(())
    }

    async fn get_run_log(&mut self, run_id: i64) -> SchedulerResult<Option<RunLog>> {
        Ok(self.working.run_logs.get(&run_id).cloned())
    }

    async fn create_kill_request(
        &mut self,
        kill_request: &KillRequest,
    ) -> SchedulerResult<KillRequest> {
        let id = next_id(&mut self.working.sequences.kill_request);
        let created = KillRequest {
            id,
            ..kill_request.clone()
        };
        self.working.kill_requests.insert(id, created.clone());
        Ok(created)
    }

    async fn lock_kill_request(&mut self, id: i64) -> SchedulerResult<Option<KillRequest>> {
        Ok(self.working.kill_requests.get(&id).cloned())
    }

    async fn update_kill_request(&mut self, kill_request: &KillRequest) -> SchedulerResult<()> {
        match self.working.kill_requests.get_mut(&kill_request.id) {
            Some(existing) => {
                *existing = kill_request.clone();
                Ok(())
            }
            None => Err(SchedulerError::KillRequestNotFound {
                id: kill_request.id,
            }),
        }
    }

    async fn get_killable_kill_requests(&mut self) -> SchedulerResult<Vec<KillRequest>> {
        Ok(self
            .working
            .kill_requests
            .values()
            .filter(|kill_request| {
                self.working
                    .runs
                    .get(&kill_request.run_id)
                    .is_some_and(|run| is_kill_request_killable(kill_request, run))
            })
            .cloned()
            .collect())
    }

    async fn create_worker(&mut self, worker: &Worker) -> SchedulerResult<Worker> {
        if self
            .working
            .workers
            .values()
            .any(|existing| existing.api_key == worker.api_key)
        {
            return Err(SchedulerError::DatabaseOperation(format!(
                "Worker API key 已存在: {}",
                worker.api_key
            )));
        }

        let id = next_id(&mut self.working.sequences.worker);
        let created = Worker {
            id,
            ..worker.clone()
        };
        self.working.workers.insert(id, created.clone());
        Ok(created)
    }

    async fn get_worker(&mut self, id: i64) -> SchedulerResult<Option<Worker>> {
        Ok(self.working.workers.get(&id).cloned())
    }

    async fn get_worker_by_api_key(&mut self, api_key: &str) -> SchedulerResult<Option<Worker>> {
        Ok(self
            .working
            .workers
            .values()
            .find(|worker| worker.api_key == api_key)
            .cloned())
    }

    async fn update_worker(&mut self, worker: &Worker) -> SchedulerResult<()> {
        match self.working.workers.get_mut(&worker.id) {
            Some(existing) => {
                *existing = worker.clone();
                Ok(())
            }
            None => Err(SchedulerError::WorkerNotFound {
                key: worker.api_key.clone(),
            }),
        }
    }

    async fn list_workers(&mut self) -> SchedulerResult<Vec<Worker>> {
        Ok(self.working.workers.values().cloned().collect())
    }

    async fn add_worker_to_pool(&mut self, worker_id: i64, pool_id: i64) -> SchedulerResult<()> {
        self.working.pool_members.insert((pool_id, worker_id));
        Ok(())
    }

    async fn get_enabled_pool_workers(&mut self, pool_id: i64) -> SchedulerResult<Vec<Worker>> {
        Ok(self
            .working
            .pool_members
            .iter()
            .filter(|(pool, _)| *pool == pool_id)
            .filter_map(|(_, worker_id)| self.working.workers.get(worker_id))
            .filter(|worker| worker.enqueue_is_enabled)
            .cloned()
            .collect())
    }

    async fn is_pool_member(&mut self, worker_id: i64, pool_id: i64) -> SchedulerResult<bool> {
        Ok(self.working.pool_members.contains(&(pool_id, worker_id)))
    }
}
