use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub tags: serde_json::Value,
    pub password_hash: Option<String>,
    pub hashing_algorithm: Option<String>,
}
