use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Whoami {
    pub name: String,
    #[serde(default)]
    pub tags: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_whoami_with_tag_list() {
        // Tags are a comma-joined string before 3.9 and a list after.
        let whoami: Whoami =
            serde_json::from_str(r#"{"name":"guest","tags":["administrator"]}"#).unwrap();
        assert_eq!(whoami.name, "guest");

        let whoami: Whoami =
            serde_json::from_str(r#"{"name":"guest","tags":"administrator"}"#).unwrap();
        assert_eq!(whoami.tags, serde_json::json!("administrator"));
    }
}
