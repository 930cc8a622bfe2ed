use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// 发往Worker的分发消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DispatchMessage {
    Enqueue { run_id: i64 },
    Kill { kill_request_id: i64 },
    Ping,
}

impl DispatchMessage {
    pub fn enqueue(run_id: i64) -> Self {
        DispatchMessage::Enqueue { run_id }
    }

    pub fn kill(kill_request_id: i64) -> Self {
        DispatchMessage::Kill { kill_request_id }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Worker专属的广播频道名：`<prefix>.<api_key>`
pub fn worker_channel(prefix: &str, api_key: &str) -> String {
    format!("{prefix}.{api_key}")
}

/// 运行实例事件，发布到事件频道
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunEvent {
    pub event: String,
    pub run_id: i64,
    pub kind: String,
}

impl RunEvent {
    pub fn returned(run_id: i64) -> Self {
        Self {
            event: "returned".to_string(),
            run_id,
            kind: "run".to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// 一条待发布的消息，在事务提交后统一发布
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_message_json_shape() {
        let value = serde_json::to_value(DispatchMessage::enqueue(42)).unwrap();
        assert_eq!(value, json!({"action": "enqueue", "run_id": 42}));

        let value = serde_json::to_value(DispatchMessage::kill(7)).unwrap();
        assert_eq!(value, json!({"action": "kill", "kill_request_id": 7}));

        let value = serde_json::to_value(DispatchMessage::Ping).unwrap();
        assert_eq!(value, json!({"action": "ping"}));
    }

    #[test]
    fn test_run_event_json_shape() {
        let value = serde_json::to_value(RunEvent::returned(9)).unwrap();
        assert_eq!(value, json!({"event": "returned", "run_id": 9, "kind": "run"}));
    }

    #[test]
    fn test_worker_channel() {
        assert_eq!(
            worker_channel("master.broadcast", "abc123"),
            "master.broadcast.abc123"
        );
    }
}
