use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Queue {
    pub name: String,
    pub vhost: String,
    pub node: Option<String>,
    pub state: Option<String>,
    pub durable: Option<bool>,
    pub auto_delete: Option<bool>,
    pub exclusive: Option<bool>,
    pub messages: Option<u64>,
    pub messages_ready: Option<u64>,
    pub messages_unacknowledged: Option<u64>,
    pub consumers: Option<u64>,
    pub memory: Option<u64>,
    pub arguments: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_sample_queue() {
        let json_str = r#"
        {
            "name": "work.items",
            "vhost": "/",
            "node": "rabbit@guest-1",
            "state": "running",
            "durable": true,
            "auto_delete": false,
            "exclusive": false,
            "messages": 42,
            "messages_ready": 40,
            "messages_unacknowledged": 2,
            "consumers": 1,
            "memory": 68408,
            "arguments": {"x-queue-type": "classic"}
        }"#;

        let queue: Queue = serde_json::from_str(json_str).unwrap();
        assert_eq!(queue.name, "work.items");
        assert_eq!(queue.messages, Some(42));
        assert_eq!(queue.state.as_deref(), Some("running"));
    }
}
