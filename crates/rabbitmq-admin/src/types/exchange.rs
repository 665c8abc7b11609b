use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Exchange {
    pub name: String,
    pub vhost: String,
    #[serde(rename = "type")]
    pub exchange_type: String,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub arguments: Option<serde_json::Value>,
    pub user_who_performed_action: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_sample_exchange() {
        let json_str = r#"
        {
            "name": "amq.topic",
            "vhost": "/",
            "type": "topic",
            "durable": true,
            "auto_delete": false,
            "internal": false,
            "arguments": {}
        }"#;

        let exchange: Exchange = serde_json::from_str(json_str).unwrap();
        assert_eq!(exchange.exchange_type, "topic");
        assert!(exchange.durable);
    }
}
