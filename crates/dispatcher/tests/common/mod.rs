#![allow(dead_code)]

use std::sync::Arc;

use chrono::Duration;
use chrono_tz::Tz;
use jobrunner_dispatcher::{
    DispatchBroadcaster, HealthMonitor, JobController, NotificationSettings, RandomStrategy,
    RescheduleEngine, RunLifecycleHandler,
};
use jobrunner_infrastructure::{InMemoryPublisher, MetricsCollector};
use jobrunner_testing_utils::{Fixture, RecordingNotifier};

pub const CHANNEL_PREFIX: &str = "master.broadcast";
pub const EVENT_CHANNEL: &str = "worker.event";
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// 3 × 300秒 + 15秒
pub fn unresponsive_threshold() -> Duration {
    Duration::seconds(915)
}

pub struct Harness {
    pub fixture: Fixture,
    pub publisher: InMemoryPublisher,
    pub notifier: RecordingNotifier,
    pub lifecycle: Arc<RunLifecycleHandler>,
    pub controller: JobController,
    pub broadcaster: DispatchBroadcaster,
    pub monitor: HealthMonitor,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_notifier(RecordingNotifier::new()).await
    }

    pub async fn with_notifier(notifier: RecordingNotifier) -> Self {
        let fixture = Fixture::new().await.unwrap();
        let publisher = InMemoryPublisher::new();
        let metrics = Arc::new(MetricsCollector::new());

        let lifecycle = Arc::new(RunLifecycleHandler::new(
            RescheduleEngine::new(Tz::UTC, metrics.clone()),
            NotificationSettings::new(vec![ADMIN_EMAIL.to_string()], "test-host"),
            metrics.clone(),
        ));
        let controller = JobController::new(
            fixture.store(),
            Arc::new(notifier.clone()),
            lifecycle.clone(),
        );
        let broadcaster = DispatchBroadcaster::new(
            fixture.store(),
            Arc::new(publisher.clone()),
            Arc::new(RandomStrategy::new()),
            metrics.clone(),
            CHANNEL_PREFIX,
        );
        let monitor = HealthMonitor::new(
            fixture.store(),
            Arc::new(publisher.clone()),
            Arc::new(notifier.clone()),
            lifecycle.clone(),
            metrics,
            EVENT_CHANNEL,
            unresponsive_threshold(),
        );

        Self {
            fixture,
            publisher,
            notifier,
            lifecycle,
            controller,
            broadcaster,
            monitor,
        }
    }

    pub fn channel(api_key: &str) -> String {
        format!("{CHANNEL_PREFIX}.{api_key}")
    }
}
