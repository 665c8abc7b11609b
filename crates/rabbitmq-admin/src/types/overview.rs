use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ObjectTotals {
    pub channels: Option<u64>,
    pub connections: Option<u64>,
    pub consumers: Option<u64>,
    pub exchanges: Option<u64>,
    pub queues: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QueueTotals {
    pub messages: Option<u64>,
    pub messages_ready: Option<u64>,
    pub messages_unacknowledged: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MessageStats {
    pub publish: Option<u64>,
    pub deliver_get: Option<u64>,
    pub ack: Option<u64>,
    pub redeliver: Option<u64>,
    pub confirm: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Overview {
    pub cluster_name: Option<String>,
    pub node: String,
    pub management_version: Option<String>,
    pub rabbitmq_version: Option<String>,
    pub erlang_version: Option<String>,
    pub object_totals: Option<ObjectTotals>,
    pub queue_totals: Option<QueueTotals>,
    pub message_stats: Option<MessageStats>,
}
