use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Node {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub running: bool,
    pub uptime: Option<u64>,
    pub mem_used: Option<u64>,
    pub mem_limit: Option<u64>,
    pub mem_alarm: Option<bool>,
    pub disk_free: Option<u64>,
    pub disk_free_limit: Option<u64>,
    pub disk_free_alarm: Option<bool>,
    pub fd_used: Option<u64>,
    pub fd_total: Option<u64>,
    pub proc_used: Option<u64>,
    pub proc_total: Option<u64>,
    pub sockets_used: Option<u64>,
    pub sockets_total: Option<u64>,
    pub os_pid: Option<String>,
}
