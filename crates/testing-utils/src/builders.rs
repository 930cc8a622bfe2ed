//! 测试数据构建器
//!
//! 默认值可以直接使用，按需覆盖字段。

use chrono::{DateTime, Utc};
use jobrunner_core::models::{IntervalType, Job, RescheduleType, Run, Worker};

/// Builder for creating test Job entities
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(job_template_id: i64, worker_pool_id: i64) -> Self {
        Self {
            job: Job::new("test_job", job_template_id, worker_pool_id),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.job.title = title.to_string();
        self
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.job.parent_id = Some(parent_id);
        self
    }

    pub fn with_interval(mut self, interval_type: IntervalType, interval: i32) -> Self {
        self.job.reschedule_interval_type = Some(interval_type);
        self.job.reschedule_interval = Some(interval);
        self
    }

    pub fn with_reschedule_type(mut self, reschedule_type: RescheduleType) -> Self {
        self.job.reschedule_type = reschedule_type;
        self
    }

    pub fn with_disable_after_fails(mut self, fails: i32) -> Self {
        self.job.disable_enqueue_after_fails = Some(fails);
        self
    }

    pub fn with_notification_addresses(mut self, addresses: &str) -> Self {
        self.job.notification_addresses = addresses.to_string();
        self
    }

    pub fn on_all_workers(mut self) -> Self {
        self.job.run_on_all_workers = true;
        self
    }

    pub fn schedule_children_on_error(mut self) -> Self {
        self.job.schedule_children_on_error = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.job.enqueue_is_enabled = false;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for creating test Run entities
pub struct RunBuilder {
    run: Run,
}

impl RunBuilder {
    pub fn new(job_id: i64, schedule_dts: DateTime<Utc>) -> Self {
        Self {
            run: Run::new(job_id, schedule_dts),
        }
    }

    pub fn with_schedule_id(mut self, schedule_id: i64) -> Self {
        self.run.schedule_id = schedule_id;
        self
    }

    pub fn with_worker(mut self, worker_id: i64) -> Self {
        self.run.worker_id = Some(worker_id);
        self
    }

    pub fn enqueued_at(mut self, dts: DateTime<Utc>) -> Self {
        self.run.enqueue_dts = Some(dts);
        self
    }

    pub fn started_at(mut self, dts: DateTime<Utc>, pid: i64) -> Self {
        if self.run.enqueue_dts.is_none() {
            self.run.enqueue_dts = Some(dts);
        }
        self.run.start_dts = Some(dts);
        self.run.pid = Some(pid);
        self
    }

    pub fn returned_at(mut self, dts: DateTime<Utc>, success: bool) -> Self {
        if self.run.start_dts.is_none() {
            self.run.start_dts = Some(dts);
        }
        if self.run.enqueue_dts.is_none() {
            self.run.enqueue_dts = Some(dts);
        }
        self.run.return_dts = Some(dts);
        self.run.return_success = Some(success);
        self
    }

    pub fn manual(mut self) -> Self {
        self.run.is_manual = true;
        self
    }

    pub fn without_children(mut self) -> Self {
        self.run.schedule_children = false;
        self
    }

    pub fn build(self) -> Run {
        self.run
    }
}

/// Builder for creating test Worker entities
pub struct WorkerBuilder {
    worker: Worker,
}

impl WorkerBuilder {
    pub fn new(api_key: &str) -> Self {
        Self {
            worker: Worker::new(&format!("worker-{api_key}"), api_key),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.worker.title = title.to_string();
        self
    }

    pub fn pinged_at(mut self, dts: DateTime<Utc>) -> Self {
        self.worker.ping_response_dts = Some(dts);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.worker.enqueue_is_enabled = false;
        self
    }

    pub fn build(self) -> Worker {
        self.worker
    }
}
