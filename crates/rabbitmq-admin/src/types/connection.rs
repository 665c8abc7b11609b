use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Connection {
    pub name: String,
    pub node: String,
    pub state: Option<String>,
    pub user: String,
    pub vhost: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub peer_host: Option<String>,
    pub peer_port: Option<u16>,
    pub protocol: Option<String>,
    pub channels: Option<u32>,
    pub connected_at: Option<u64>,
    pub recv_oct: Option<u64>,
    pub send_oct: Option<u64>,
    pub ssl: Option<bool>,
    pub client_properties: Option<serde_json::Value>,
}
