use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobrunner_core::{
    config::DatabaseConfig,
    models::{
        Job, JobContext, JobTemplate, KillRequest, Project, RescheduleExclude, Run, RunLog,
        Worker, WorkerPool,
    },
    traits::{Store, StoreTransaction},
    SchedulerError, SchedulerResult,
};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{debug, instrument};

use super::mapping::{
    row_to_job, row_to_job_template, row_to_kill_request, row_to_project,
    row_to_reschedule_exclude, row_to_run, row_to_worker, row_to_worker_pool, JOB_COLUMNS,
    KILL_REQUEST_COLUMNS, RUN_COLUMNS, WORKER_COLUMNS,
};

const PROJECT_SELECT: &str = "SELECT p.id, p.title, p.enqueue_is_enabled, p.notification_addresses, \
     COALESCE((SELECT array_agg(pwp.worker_pool_id ORDER BY pwp.worker_pool_id) \
               FROM project_worker_pools pwp WHERE pwp.project_id = p.id), '{}'::BIGINT[]) \
     AS worker_pool_ids FROM projects p";

/// PostgreSQL存储
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        debug!("已连接到PostgreSQL");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> SchedulerResult<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

/// PostgreSQL事务，加锁读取使用 `SELECT ... FOR UPDATE`
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    async fn fetch_runs(&mut self, sql: &str, bind: i64) -> SchedulerResult<Vec<Run>> {
        let rows = sqlx::query(sql).bind(bind).fetch_all(&mut *self.tx).await?;
        rows.iter().map(row_to_run).collect()
    }

    async fn fetch_run(&mut self, sql: &str, id: i64) -> SchedulerResult<Option<Run>> {
        let row = sqlx::query(sql).bind(id).fetch_optional(&mut *self.tx).await?;
        row.as_ref().map(row_to_run).transpose()
    }

    async fn fetch_job(&mut self, sql: &str, id: i64) -> SchedulerResult<Option<Job>> {
        let row = sqlx::query(sql).bind(id).fetch_optional(&mut *self.tx).await?;
        row.as_ref().map(row_to_job).transpose()
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn commit(self: Box<Self>) -> SchedulerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SchedulerResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    async fn create_project(&mut self, project: &Project) -> SchedulerResult<Project> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO projects (title, enqueue_is_enabled, notification_addresses) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&project.title)
        .bind(project.enqueue_is_enabled)
        .bind(&project.notification_addresses)
        .fetch_one(&mut *self.tx)
        .await?;

        for pool_id in &project.worker_pool_ids {
            sqlx::query(
                "INSERT INTO project_worker_pools (project_id, worker_pool_id) VALUES ($1, $2)",
            )
            .bind(id)
            .bind(pool_id)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(Project {
            id,
            ..project.clone()
        })
    }

    async fn get_project(&mut self, id: i64) -> SchedulerResult<Option<Project>> {
        let sql = format!("{PROJECT_SELECT} WHERE p.id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_project).transpose()
    }

    async fn create_job_template(
        &mut self,
        template: &JobTemplate,
    ) -> SchedulerResult<JobTemplate> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO job_templates (title, project_id, enqueue_is_enabled, notification_addresses) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&template.title)
        .bind(template.project_id)
        .bind(template.enqueue_is_enabled)
        .bind(&template.notification_addresses)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(JobTemplate {
            id,
            ..template.clone()
        })
    }

    async fn get_job_template(&mut self, id: i64) -> SchedulerResult<Option<JobTemplate>> {
        let row = sqlx::query(
            "SELECT id, title, project_id, enqueue_is_enabled, notification_addresses \
             FROM job_templates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_job_template).transpose()
    }

    async fn create_worker_pool(&mut self, pool: &WorkerPool) -> SchedulerResult<WorkerPool> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO worker_pools (title, enqueue_is_enabled, notification_addresses) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&pool.title)
        .bind(pool.enqueue_is_enabled)
        .bind(&pool.notification_addresses)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(WorkerPool { id, ..pool.clone() })
    }

    async fn get_worker_pool(&mut self, id: i64) -> SchedulerResult<Option<WorkerPool>> {
        let row = sqlx::query(
            "SELECT id, title, enqueue_is_enabled, notification_addresses \
             FROM worker_pools WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_worker_pool).transpose()
    }

    async fn list_enabled_worker_pools(&mut self) -> SchedulerResult<Vec<WorkerPool>> {
        let rows = sqlx::query(
            "SELECT id, title, enqueue_is_enabled, notification_addresses \
             FROM worker_pools WHERE enqueue_is_enabled ORDER BY id",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_worker_pool).collect()
    }

    #[instrument(skip(self, job), fields(job_title = %job.title))]
    async fn create_job(&mut self, job: &Job) -> SchedulerResult<Job> {
        let sql = format!(
            "INSERT INTO jobs (title, parent_id, job_template_id, worker_pool_id, \
             enqueue_is_enabled, run_on_all_workers, schedule_children_on_error, \
             reschedule_interval, reschedule_interval_type, reschedule_type, \
             notification_addresses, fail_times, disable_enqueue_after_fails, \
             last_completed_schedule_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&job.title)
            .bind(job.parent_id)
            .bind(job.job_template_id)
            .bind(job.worker_pool_id)
            .bind(job.enqueue_is_enabled)
            .bind(job.run_on_all_workers)
            .bind(job.schedule_children_on_error)
            .bind(job.reschedule_interval)
            .bind(job.reschedule_interval_type)
            .bind(job.reschedule_type)
            .bind(&job.notification_addresses)
            .bind(job.fail_times)
            .bind(job.disable_enqueue_after_fails)
            .bind(job.last_completed_schedule_id)
            .fetch_one(&mut *self.tx)
            .await?;

        row_to_job(&row)
    }

    async fn get_job(&mut self, id: i64) -> SchedulerResult<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        self.fetch_job(&sql, id).await
    }

    async fn lock_job(&mut self, id: i64) -> SchedulerResult<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE");
        self.fetch_job(&sql, id).await
    }

    async fn update_job(&mut self, job: &Job) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET title = $2, parent_id = $3, job_template_id = $4, \
             worker_pool_id = $5, enqueue_is_enabled = $6, run_on_all_workers = $7, \
             schedule_children_on_error = $8, reschedule_interval = $9, \
             reschedule_interval_type = $10, reschedule_type = $11, \
             notification_addresses = $12, fail_times = $13, \
             disable_enqueue_after_fails = $14, last_completed_schedule_id = $15 \
             WHERE id = $1",
        )
        .bind(job.id)
        .bind(&job.title)
        .bind(job.parent_id)
        .bind(job.job_template_id)
        .bind(job.worker_pool_id)
        .bind(job.enqueue_is_enabled)
        .bind(job.run_on_all_workers)
        .bind(job.schedule_children_on_error)
        .bind(job.reschedule_interval)
        .bind(job.reschedule_interval_type)
        .bind(job.reschedule_type)
        .bind(&job.notification_addresses)
        .bind(job.fail_times)
        .bind(job.disable_enqueue_after_fails)
        .bind(job.last_completed_schedule_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::JobNotFound { id: job.id });
        }
        Ok(())
    }

    async fn get_child_jobs(&mut self, parent_id: i64) -> SchedulerResult<Vec<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE parent_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(parent_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    async fn get_job_context(&mut self, job_id: i64) -> SchedulerResult<Option<JobContext>> {
        let Some(job) = self.get_job(job_id).await? else {
            return Ok(None);
        };
        let template = self
            .get_job_template(job.job_template_id)
            .await?
            .ok_or_else(|| {
                SchedulerError::DatabaseOperation(format!(
                    "作业 {} 的模板 {} 不存在",
                    job.id, job.job_template_id
                ))
            })?;
        let project = self.get_project(template.project_id).await?.ok_or_else(|| {
            SchedulerError::DatabaseOperation(format!(
                "模板 {} 的项目 {} 不存在",
                template.id, template.project_id
            ))
        })?;
        let pool = self
            .get_worker_pool(job.worker_pool_id)
            .await?
            .ok_or_else(|| {
                SchedulerError::DatabaseOperation(format!(
                    "作业 {} 的Worker池 {} 不存在",
                    job.id, job.worker_pool_id
                ))
            })?;

        Ok(Some(JobContext {
            job,
            template,
            project,
            pool,
        }))
    }

    async fn create_reschedule_exclude(
        &mut self,
        exclude: &RescheduleExclude,
    ) -> SchedulerResult<RescheduleExclude> {
        let row = sqlx::query(
            "INSERT INTO reschedule_excludes (job_id, start_time, end_time, note) \
             VALUES ($1, $2, $3, $4) RETURNING id, job_id, start_time, end_time, note",
        )
        .bind(exclude.job_id)
        .bind(exclude.start_time)
        .bind(exclude.end_time)
        .bind(&exclude.note)
        .fetch_one(&mut *self.tx)
        .await?;
        row_to_reschedule_exclude(&row)
    }

    async fn get_reschedule_excludes(
        &mut self,
        job_id: i64,
    ) -> SchedulerResult<Vec<RescheduleExclude>> {
        let rows = sqlx::query(
            "SELECT id, job_id, start_time, end_time, note FROM reschedule_excludes \
             WHERE job_id = $1 ORDER BY start_time",
        )
        .bind(job_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_reschedule_exclude).collect()
    }

    #[instrument(skip(self, run), fields(job_id = %run.job_id, schedule_dts = %run.schedule_dts))]
    async fn create_run(&mut self, run: &Run) -> SchedulerResult<Run> {
        let sql = format!(
            "WITH next AS (SELECT nextval(pg_get_serial_sequence('runs', 'id')) AS id) \
             INSERT INTO runs (id, job_id, schedule_id, worker_id, schedule_dts, enqueue_dts, \
             start_dts, return_dts, return_success, pid, is_manual, schedule_children) \
             SELECT next.id, $1, COALESCE(NULLIF($2::BIGINT, 0), next.id), $3, $4, $5, $6, $7, $8, \
             $9, $10, $11 FROM next \
             RETURNING {RUN_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(run.job_id)
            .bind(run.schedule_id)
            .bind(run.worker_id)
            .bind(run.schedule_dts)
            .bind(run.enqueue_dts)
            .bind(run.start_dts)
            .bind(run.return_dts)
            .bind(run.return_success)
            .bind(run.pid)
            .bind(run.is_manual)
            .bind(run.schedule_children)
            .fetch_one(&mut *self.tx)
            .await?;

        let created = row_to_run(&row)?;
        debug!("创建运行实例成功: ID {}, 批次 {}", created.id, created.schedule_id);
        Ok(created)
    }

    async fn get_run(&mut self, id: i64) -> SchedulerResult<Option<Run>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = $1");
        self.fetch_run(&sql, id).await
    }

    async fn lock_run(&mut self, id: i64) -> SchedulerResult<Option<Run>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = $1 FOR UPDATE");
        self.fetch_run(&sql, id).await
    }

    async fn update_run(&mut self, run: &Run) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE runs SET schedule_id = $2, worker_id = $3, schedule_dts = $4, \
             enqueue_dts = $5, start_dts = $6, return_dts = $7, return_success = $8, \
             pid = $9, is_manual = $10, schedule_children = $11 WHERE id = $1",
        )
        .bind(run.id)
        .bind(run.schedule_id)
        .bind(run.worker_id)
        .bind(run.schedule_dts)
        .bind(run.enqueue_dts)
        .bind(run.start_dts)
        .bind(run.return_dts)
        .bind(run.return_success)
        .bind(run.pid)
        .bind(run.is_manual)
        .bind(run.schedule_children)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::RunNotFound { id: run.id });
        }
        Ok(())
    }

    async fn delete_run(&mut self, id: i64) -> SchedulerResult<()> {
        sqlx::query("DELETE FROM runs WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn lock_enqueueable_runs(&mut self, now: DateTime<Utc>) -> SchedulerResult<Vec<Run>> {
        let rows = sqlx::query(
            "SELECT r.id, r.job_id, r.schedule_id, r.worker_id, r.schedule_dts, r.enqueue_dts, \
             r.start_dts, r.return_dts, r.return_success, r.pid, r.is_manual, r.schedule_children \
             FROM runs r \
             JOIN jobs j ON j.id = r.job_id \
             JOIN job_templates t ON t.id = j.job_template_id \
             JOIN projects p ON p.id = t.project_id \
             JOIN worker_pools wp ON wp.id = j.worker_pool_id \
             WHERE r.schedule_dts <= $1 \
               AND r.enqueue_dts IS NULL \
               AND r.return_dts IS NULL \
               AND (r.is_manual OR (j.enqueue_is_enabled AND t.enqueue_is_enabled \
                    AND p.enqueue_is_enabled AND wp.enqueue_is_enabled)) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM runs o \
                   WHERE o.job_id = r.job_id AND o.id <> r.id \
                     AND o.schedule_id <> r.schedule_id \
                     AND o.enqueue_dts IS NOT NULL AND o.return_dts IS NULL) \
             ORDER BY r.schedule_dts, r.id \
             FOR UPDATE OF r SKIP LOCKED",
        )
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_run).collect()
    }

    async fn lock_unfinished_batch_runs(
        &mut self,
        schedule_id: i64,
        exclude_run_id: i64,
    ) -> SchedulerResult<Vec<Run>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM runs \
             WHERE schedule_id = $1 AND id <> $2 AND return_dts IS NULL \
             ORDER BY id FOR UPDATE"
        );
        let rows = sqlx::query(&sql)
            .bind(schedule_id)
            .bind(exclude_run_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_run).collect()
    }

    async fn get_batch_runs(&mut self, schedule_id: i64) -> SchedulerResult<Vec<Run>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE schedule_id = $1 ORDER BY id");
        self.fetch_runs(&sql, schedule_id).await
    }

    async fn get_job_runs(&mut self, job_id: i64) -> SchedulerResult<Vec<Run>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE job_id = $1 ORDER BY id");
        self.fetch_runs(&sql, job_id).await
    }

    async fn has_unfinished_runs(&mut self, job_id: i64) -> SchedulerResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM runs WHERE job_id = $1 AND return_dts IS NULL)",
        )
        .bind(job_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn get_last_scheduled_run(&mut self, job_id: i64) -> SchedulerResult<Option<Run>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE job_id = $1 AND NOT is_manual \
             ORDER BY id DESC LIMIT 1"
        );
        self.fetch_run(&sql, job_id).await
    }

    async fn has_due_pending_run(
        &mut self,
        job_id: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM runs WHERE job_id = $1 AND NOT is_manual \
             AND return_dts IS NULL AND schedule_dts <= $2)",
        )
        .bind(job_id)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn get_unreturned_runs_for_worker(
        &mut self,
        worker_id: i64,
    ) -> SchedulerResult<Vec<Run>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM runs \
             WHERE worker_id = $1 AND return_dts IS NULL \
             ORDER BY job_id, id"
        );
        self.fetch_runs(&sql, worker_id).await
    }

    async fn save_run_log(&mut self, log: &RunLog) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO run_logs (run_id, content) VALUES ($1, $2) \
             ON CONFLICT (run_id) DO UPDATE SET content = EXCLUDED.content",
        )
        .bind(log.run_id)
        .bind(&log.content)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_run_log(&mut self, run_id: i64) -> SchedulerResult<Option<RunLog>> {
        let row = sqlx::query("SELECT run_id, content FROM run_logs WHERE run_id = $1")
            .bind(run_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(Some(RunLog {
                run_id: row.try_get("run_id")?,
                content: row.try_get("content")?,
            })),
            None => Ok(None),
        }
    }

    async fn create_kill_request(
        &mut self,
        kill_request: &KillRequest,
    ) -> SchedulerResult<KillRequest> {
        let sql = format!(
            "INSERT INTO kill_requests (run_id, schedule_dts, enqueue_dts, execute_dts) \
             VALUES ($1, $2, $3, $4) RETURNING {KILL_REQUEST_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(kill_request.run_id)
            .bind(kill_request.schedule_dts)
            .bind(kill_request.enqueue_dts)
            .bind(kill_request.execute_dts)
            .fetch_one(&mut *self.tx)
            .await?;
        row_to_kill_request(&row)
    }

    async fn lock_kill_request(&mut self, id: i64) -> SchedulerResult<Option<KillRequest>> {
        let sql =
            format!("SELECT {KILL_REQUEST_COLUMNS} FROM kill_requests WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_kill_request).transpose()
    }

    async fn update_kill_request(&mut self, kill_request: &KillRequest) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE kill_requests SET enqueue_dts = $2, execute_dts = $3 WHERE id = $1",
        )
        .bind(kill_request.id)
        .bind(kill_request.enqueue_dts)
        .bind(kill_request.execute_dts)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::KillRequestNotFound {
                id: kill_request.id,
            });
        }
        Ok(())
    }

    async fn get_killable_kill_requests(&mut self) -> SchedulerResult<Vec<KillRequest>> {
        let rows = sqlx::query(
            "SELECT k.id, k.run_id, k.schedule_dts, k.enqueue_dts, k.execute_dts \
             FROM kill_requests k JOIN runs r ON r.id = k.run_id \
             WHERE k.enqueue_dts IS NULL AND k.execute_dts IS NULL \
               AND r.start_dts IS NOT NULL AND r.pid IS NOT NULL \
               AND r.return_dts IS NULL AND r.worker_id IS NOT NULL \
             ORDER BY k.id",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_kill_request).collect()
    }

    async fn create_worker(&mut self, worker: &Worker) -> SchedulerResult<Worker> {
        let sql = format!(
            "INSERT INTO workers (title, api_key, enqueue_is_enabled, ping_response_dts, \
             worker_version, concurrent_jobs) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {WORKER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&worker.title)
            .bind(&worker.api_key)
            .bind(worker.enqueue_is_enabled)
            .bind(worker.ping_response_dts)
            .bind(&worker.worker_version)
            .bind(worker.concurrent_jobs)
            .fetch_one(&mut *self.tx)
            .await?;
        row_to_worker(&row)
    }

    async fn get_worker(&mut self, id: i64) -> SchedulerResult<Option<Worker>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_worker).transpose()
    }

    async fn get_worker_by_api_key(&mut self, api_key: &str) -> SchedulerResult<Option<Worker>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE api_key = $1");
        let row = sqlx::query(&sql)
            .bind(api_key)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_worker).transpose()
    }

    async fn update_worker(&mut self, worker: &Worker) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE workers SET title = $2, api_key = $3, enqueue_is_enabled = $4, \
             ping_response_dts = $5, worker_version = $6, concurrent_jobs = $7 WHERE id = $1",
        )
        .bind(worker.id)
        .bind(&worker.title)
        .bind(&worker.api_key)
        .bind(worker.enqueue_is_enabled)
        .bind(worker.ping_response_dts)
        .bind(&worker.worker_version)
        .bind(worker.concurrent_jobs)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::WorkerNotFound {
                key: worker.api_key.clone(),
            });
        }
        Ok(())
    }

    async fn list_workers(&mut self) -> SchedulerResult<Vec<Worker>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        rows.iter().map(row_to_worker).collect()
    }

    async fn add_worker_to_pool(&mut self, worker_id: i64, pool_id: i64) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO worker_pool_workers (worker_pool_id, worker_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(pool_id)
        .bind(worker_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_enabled_pool_workers(&mut self, pool_id: i64) -> SchedulerResult<Vec<Worker>> {
        let rows = sqlx::query(
            "SELECT w.id, w.title, w.api_key, w.enqueue_is_enabled, w.ping_response_dts, \
             w.worker_version, w.concurrent_jobs \
             FROM workers w JOIN worker_pool_workers pw ON pw.worker_id = w.id \
             WHERE pw.worker_pool_id = $1 AND w.enqueue_is_enabled ORDER BY w.id",
        )
        .bind(pool_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_worker).collect()
    }

    async fn is_pool_member(&mut self, worker_id: i64, pool_id: i64) -> SchedulerResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM worker_pool_workers \
             WHERE worker_pool_id = $1 AND worker_id = $2)",
        )
        .bind(pool_id)
        .bind(worker_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }
}
