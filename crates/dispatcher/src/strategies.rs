use rand::seq::IndexedRandom;
use tracing::debug;

use jobrunner_core::models::Worker;

/// 为未指定Worker的运行实例选择Worker
pub trait WorkerSelectionStrategy: Send + Sync {
    fn select_worker<'a>(&self, workers: &'a [Worker]) -> Option<&'a Worker>;
}

/// 从可用Worker中均匀随机选择
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl WorkerSelectionStrategy for RandomStrategy {
    fn select_worker<'a>(&self, workers: &'a [Worker]) -> Option<&'a Worker> {
        if workers.is_empty() {
            debug!("没有可用的Worker节点");
            return None;
        }

        let selected = workers.choose(&mut rand::rng());
        if let Some(worker) = selected {
            debug!(
                "随机策略选择Worker: {} (共 {} 个可用)",
                worker.api_key,
                workers.len()
            );
        }
        selected
    }
}
