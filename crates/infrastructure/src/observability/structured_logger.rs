//! Structured logging of dispatch engine events

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// 新的运行实例已创建
    pub fn log_run_scheduled(run_id: i64, job_id: i64, schedule_dts: DateTime<Utc>, manual: bool) {
        info!(
            event = "run_scheduled",
            run.id = run_id,
            job.id = job_id,
            run.schedule_dts = %schedule_dts,
            run.is_manual = manual,
            "运行实例已调度"
        );
    }

    pub fn log_run_dispatched(run_id: i64, job_id: i64, schedule_id: i64, worker_key: &str) {
        info!(
            event = "run_dispatched",
            run.id = run_id,
            job.id = job_id,
            run.schedule_id = schedule_id,
            worker.api_key = worker_key,
            "运行实例已分发"
        );
    }

    pub fn log_run_fanned_out(job_id: i64, schedule_id: i64, worker_count: usize) {
        info!(
            event = "run_fanned_out",
            job.id = job_id,
            run.schedule_id = schedule_id,
            worker.count = worker_count,
            "运行实例已扇出到所有Worker"
        );
    }

    pub fn log_no_worker_available(run_id: i64, job_id: i64, pool_id: i64) {
        warn!(
            event = "no_worker_available",
            run.id = run_id,
            job.id = job_id,
            worker_pool.id = pool_id,
            "Worker池中没有可用的Worker"
        );
    }

    pub fn log_kill_request_dispatched(kill_request_id: i64, run_id: i64, worker_key: &str) {
        info!(
            event = "kill_request_dispatched",
            kill_request.id = kill_request_id,
            run.id = run_id,
            worker.api_key = worker_key,
            "终止请求已分发"
        );
    }

    pub fn log_run_returned(run_id: i64, job_id: i64, success: bool) {
        if success {
            info!(
                event = "run_returned",
                run.id = run_id,
                job.id = job_id,
                run.success = success,
                "运行实例执行成功"
            );
        } else {
            warn!(
                event = "run_returned",
                run.id = run_id,
                job.id = job_id,
                run.success = success,
                "运行实例执行失败"
            );
        }
    }

    pub fn log_run_forced_failed(run_id: i64, worker_key: &str) {
        warn!(
            event = "run_forced_failed",
            run.id = run_id,
            worker.api_key = worker_key,
            "Worker无响应，运行实例被强制标记为失败"
        );
    }

    pub fn log_reschedule_failed(job_id: i64, reason: &str) {
        error!(
            event = "reschedule_failed",
            job.id = job_id,
            reason = reason,
            "作业重新调度失败"
        );
    }

    pub fn log_job_disabled(job_id: i64, fail_times: i32) {
        warn!(
            event = "job_auto_disabled",
            job.id = job_id,
            job.fail_times = fail_times,
            "作业连续失败次数超过阈值，已禁用入队"
        );
    }

    pub fn log_worker_unresponsive(worker_key: &str, last_ping: Option<DateTime<Utc>>) {
        warn!(
            event = "worker_unresponsive",
            worker.api_key = worker_key,
            worker.ping_response_dts = ?last_ping,
            "Worker无响应"
        );
    }

    pub fn log_pool_unresponsive(pool_id: i64, pool_title: &str) {
        error!(
            event = "worker_pool_unresponsive",
            worker_pool.id = pool_id,
            worker_pool.title = pool_title,
            "Worker池中所有Worker都无响应"
        );
    }

    pub fn log_ping_response(worker_key: &str, version: Option<&str>, concurrent_jobs: Option<i32>) {
        debug!(
            event = "ping_response",
            worker.api_key = worker_key,
            worker.version = version,
            worker.concurrent_jobs = concurrent_jobs,
            "收到Worker心跳响应"
        );
    }
}
