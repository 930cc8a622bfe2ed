//! Metrics collector for the dispatch engine
//!
//! Without an installed recorder every handle is a no-op, so the collector is
//! safe to construct in tests.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

/// Metrics collector for broadcaster, health monitor and run lifecycle
#[derive(Clone)]
pub struct MetricsCollector {
    runs_dispatched_total: Counter,
    kill_requests_dispatched_total: Counter,
    pings_sent_total: Counter,
    publish_failures_total: Counter,

    runs_completed_total: Counter,
    runs_failed_total: Counter,
    runs_forced_failed_total: Counter,
    runs_scheduled_total: Counter,
    reschedule_failures_total: Counter,
    jobs_auto_disabled_total: Counter,

    unresponsive_workers: Gauge,
    unresponsive_pools: Gauge,

    dispatch_sweep_duration: Histogram,
    health_check_duration: Histogram,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            runs_dispatched_total: counter!("jobrunner_runs_dispatched_total"),
            kill_requests_dispatched_total: counter!("jobrunner_kill_requests_dispatched_total"),
            pings_sent_total: counter!("jobrunner_pings_sent_total"),
            publish_failures_total: counter!("jobrunner_publish_failures_total"),
            runs_completed_total: counter!("jobrunner_runs_completed_total"),
            runs_failed_total: counter!("jobrunner_runs_failed_total"),
            runs_forced_failed_total: counter!("jobrunner_runs_forced_failed_total"),
            runs_scheduled_total: counter!("jobrunner_runs_scheduled_total"),
            reschedule_failures_total: counter!("jobrunner_reschedule_failures_total"),
            jobs_auto_disabled_total: counter!("jobrunner_jobs_auto_disabled_total"),
            unresponsive_workers: gauge!("jobrunner_unresponsive_workers"),
            unresponsive_pools: gauge!("jobrunner_unresponsive_pools"),
            dispatch_sweep_duration: histogram!("jobrunner_dispatch_sweep_duration_seconds"),
            health_check_duration: histogram!("jobrunner_health_check_duration_seconds"),
        }
    }

    // Dispatch

    pub fn record_runs_dispatched(&self, count: u64) {
        self.runs_dispatched_total.increment(count);
    }

    pub fn record_kill_requests_dispatched(&self, count: u64) {
        self.kill_requests_dispatched_total.increment(count);
    }

    pub fn record_pings_sent(&self, count: u64) {
        self.pings_sent_total.increment(count);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures_total.increment(1);
    }

    pub fn record_dispatch_sweep_duration(&self, duration_seconds: f64) {
        self.dispatch_sweep_duration.record(duration_seconds);
    }

    // Run lifecycle

    pub fn record_run_returned(&self, success: bool) {
        if success {
            self.runs_completed_total.increment(1);
        } else {
            self.runs_failed_total.increment(1);
        }
    }

    pub fn record_run_forced_failed(&self) {
        self.runs_forced_failed_total.increment(1);
    }

    pub fn record_run_scheduled(&self) {
        self.runs_scheduled_total.increment(1);
    }

    pub fn record_reschedule_failure(&self) {
        self.reschedule_failures_total.increment(1);
    }

    pub fn record_job_auto_disabled(&self) {
        self.jobs_auto_disabled_total.increment(1);
    }

    // Health

    pub fn update_unresponsive_workers(&self, count: f64) {
        self.unresponsive_workers.set(count);
    }

    pub fn update_unresponsive_pools(&self, count: f64) {
        self.unresponsive_pools.set(count);
    }

    pub fn record_health_check_duration(&self, duration_seconds: f64) {
        self.health_check_duration.record(duration_seconds);
    }
}
