use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TopProcess {
    pub pid: Option<serde_json::Value>,
    pub name: Option<String>,
    pub reductions: Option<u64>,
    pub memory: Option<u64>,
    pub message_queue_len: Option<u64>,
    pub status: Option<String>,
}

/// Process rankings for a single node, as reported by the `top` plugin.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NodeTop {
    pub node: String,
    pub row_count: Option<u64>,
    #[serde(default)]
    pub processes: Vec<TopProcess>,
}
