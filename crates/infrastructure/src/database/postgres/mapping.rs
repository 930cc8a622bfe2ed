//! 数据库行到领域模型的映射

use jobrunner_core::{
    models::{
        Job, JobTemplate, KillRequest, Project, RescheduleExclude, Run, Worker, WorkerPool,
    },
    SchedulerResult,
};
use sqlx::{postgres::PgRow, Row};

pub(crate) const RUN_COLUMNS: &str = "id, job_id, schedule_id, worker_id, schedule_dts, \
     enqueue_dts, start_dts, return_dts, return_success, pid, is_manual, schedule_children";

pub(crate) const JOB_COLUMNS: &str = "id, title, parent_id, job_template_id, worker_pool_id, \
     enqueue_is_enabled, run_on_all_workers, schedule_children_on_error, reschedule_interval, \
     reschedule_interval_type, reschedule_type, notification_addresses, fail_times, \
     disable_enqueue_after_fails, last_completed_schedule_id";

pub(crate) const WORKER_COLUMNS: &str = "id, title, api_key, enqueue_is_enabled, \
     ping_response_dts, worker_version, concurrent_jobs";

pub(crate) const KILL_REQUEST_COLUMNS: &str =
    "id, run_id, schedule_dts, enqueue_dts, execute_dts";

pub(crate) fn row_to_run(row: &PgRow) -> SchedulerResult<Run> {
    Ok(Run {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        schedule_id: row.try_get("schedule_id")?,
        worker_id: row.try_get("worker_id")?,
        schedule_dts: row.try_get("schedule_dts")?,
        enqueue_dts: row.try_get("enqueue_dts")?,
        start_dts: row.try_get("start_dts")?,
        return_dts: row.try_get("return_dts")?,
        return_success: row.try_get("return_success")?,
        pid: row.try_get("pid")?,
        is_manual: row.try_get("is_manual")?,
        schedule_children: row.try_get("schedule_children")?,
    })
}

pub(crate) fn row_to_job(row: &PgRow) -> SchedulerResult<Job> {
    Ok(Job {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        parent_id: row.try_get("parent_id")?,
        job_template_id: row.try_get("job_template_id")?,
        worker_pool_id: row.try_get("worker_pool_id")?,
        enqueue_is_enabled: row.try_get("enqueue_is_enabled")?,
        run_on_all_workers: row.try_get("run_on_all_workers")?,
        schedule_children_on_error: row.try_get("schedule_children_on_error")?,
        reschedule_interval: row.try_get("reschedule_interval")?,
        reschedule_interval_type: row.try_get("reschedule_interval_type")?,
        reschedule_type: row.try_get("reschedule_type")?,
        notification_addresses: row.try_get("notification_addresses")?,
        fail_times: row.try_get("fail_times")?,
        disable_enqueue_after_fails: row.try_get("disable_enqueue_after_fails")?,
        last_completed_schedule_id: row.try_get("last_completed_schedule_id")?,
    })
}

pub(crate) fn row_to_project(row: &PgRow) -> SchedulerResult<Project> {
    Ok(Project {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        enqueue_is_enabled: row.try_get("enqueue_is_enabled")?,
        notification_addresses: row.try_get("notification_addresses")?,
        worker_pool_ids: row.try_get("worker_pool_ids")?,
    })
}

pub(crate) fn row_to_job_template(row: &PgRow) -> SchedulerResult<JobTemplate> {
    Ok(JobTemplate {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        project_id: row.try_get("project_id")?,
        enqueue_is_enabled: row.try_get("enqueue_is_enabled")?,
        notification_addresses: row.try_get("notification_addresses")?,
    })
}

pub(crate) fn row_to_worker_pool(row: &PgRow) -> SchedulerResult<WorkerPool> {
    Ok(WorkerPool {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        enqueue_is_enabled: row.try_get("enqueue_is_enabled")?,
        notification_addresses: row.try_get("notification_addresses")?,
    })
}

pub(crate) fn row_to_worker(row: &PgRow) -> SchedulerResult<Worker> {
    Ok(Worker {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        api_key: row.try_get("api_key")?,
        enqueue_is_enabled: row.try_get("enqueue_is_enabled")?,
        ping_response_dts: row.try_get("ping_response_dts")?,
        worker_version: row.try_get("worker_version")?,
        concurrent_jobs: row.try_get("concurrent_jobs")?,
    })
}

pub(crate) fn row_to_kill_request(row: &PgRow) -> SchedulerResult<KillRequest> {
    Ok(KillRequest {
        id: row.try_get("id")?,
        run_id: row.try_get("run_id")?,
        schedule_dts: row.try_get("schedule_dts")?,
        enqueue_dts: row.try_get("enqueue_dts")?,
        execute_dts: row.try_get("execute_dts")?,
    })
}

pub(crate) fn row_to_reschedule_exclude(row: &PgRow) -> SchedulerResult<RescheduleExclude> {
    Ok(RescheduleExclude {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        note: row.try_get("note")?,
    })
}
