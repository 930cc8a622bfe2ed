//! 分发资格判定
//!
//! 数据库存储用SQL表达同样的条件，内存存储直接调用这里的判定函数。

use chrono::{DateTime, Utc};

use crate::models::{JobContext, KillRequest, Run};

/// 运行实例是否可以分发给Worker
///
/// - 计划时间已到，尚未入队也未返回
/// - 非手动运行时，作业、模板、项目和Worker池都允许入队
/// - 同一作业没有其他活跃（已入队未返回）的运行实例，同批次的除外
pub fn is_run_enqueueable(
    run: &Run,
    context: &JobContext,
    job_runs: &[Run],
    now: DateTime<Utc>,
) -> bool {
    if run.schedule_dts > now || run.enqueue_dts.is_some() || run.return_dts.is_some() {
        return false;
    }

    if !run.is_manual && !context.enqueue_gate_open() {
        return false;
    }

    !job_runs.iter().any(|other| {
        other.id != run.id && other.schedule_id != run.schedule_id && other.is_unreturned()
    })
}

/// 终止请求是否可以发送给Worker
pub fn is_kill_request_killable(kill_request: &KillRequest, run: &Run) -> bool {
    kill_request.enqueue_dts.is_none()
        && kill_request.execute_dts.is_none()
        && run.start_dts.is_some()
        && run.pid.is_some()
        && run.return_dts.is_none()
        && run.worker_id.is_some()
}
