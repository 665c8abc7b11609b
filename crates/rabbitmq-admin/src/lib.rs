//! Client for the read-only surface of the RabbitMQ HTTP management API.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod types;

pub use error::{Error, Result};
pub use types::*;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Default vhost used for aliveness checks.
pub const DEFAULT_VHOST: &str = "/";

/// Canonical name of the privileged configuration command.
pub const DEFAULT_CONFIG_COMMAND: &str = "CONFIG";

/// Options for constructing a [`ManagementClient`].
pub struct ManagementClientOptions {
    /// Base URL of the management API, e.g. `http://localhost:15672`.
    pub api_url: String,

    /// Username for basic authentication.
    pub username: String,

    /// Password for basic authentication.
    pub password: String,
}

/// Client wrapping the broker's HTTP management API for read-only
/// introspection.
///
/// Also holds the in-memory alias for the privileged configuration command;
/// callers must present the active alias to have the command translated back
/// to its canonical name.
pub struct ManagementClient {
    api_url: Url,
    client: Client,
    config_command: RwLock<String>,
    password: String,
    username: String,
}

impl ManagementClient {
    /// Creates a new `ManagementClient` with the specified options.
    ///
    /// # Errors
    ///
    /// Returns an error if `api_url` is not a valid base URL.
    pub fn new(
        ManagementClientOptions {
            api_url,
            username,
            password,
        }: ManagementClientOptions,
    ) -> Result<Self> {
        Ok(Self {
            api_url: Url::parse(&api_url)?,
            client: Client::new(),
            config_command: RwLock::new(DEFAULT_CONFIG_COMMAND.to_string()),
            password,
            username,
        })
    }

    /// Sets the active name of the privileged configuration command, or
    /// restores the default when `None`.
    pub async fn set_config_command_name(&self, name: Option<String>) {
        let mut guard = self.config_command.write().await;
        *guard = name.unwrap_or_else(|| DEFAULT_CONFIG_COMMAND.to_string());
    }

    /// Returns the active name of the privileged configuration command.
    pub async fn config_command_name(&self) -> String {
        self.config_command.read().await.clone()
    }

    /// Translates an invocation of the privileged configuration command back
    /// to its canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandRejected`] if `name` does not match the
    /// active alias.
    pub async fn translate_config_command(&self, name: &str) -> Result<&'static str> {
        if *self.config_command.read().await == name {
            Ok(DEFAULT_CONFIG_COMMAND)
        } else {
            Err(Error::CommandRejected)
        }
    }

    /// Runs the aliveness check against the given vhost.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API answers with a
    /// non-success status.
    pub async fn aliveness_test(&self, vhost: &str) -> Result<Aliveness> {
        self.get_json(self.endpoint(&["api", "aliveness-test", vhost])?)
            .await
    }

    /// Fetches broker overview information.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// parsed.
    pub async fn overview(&self) -> Result<Overview> {
        self.get_json(self.endpoint(&["api", "overview"])?).await
    }

    /// Lists the nodes in the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// parsed.
    pub async fn nodes(&self) -> Result<Vec<Node>> {
        self.get_json(self.endpoint(&["api", "nodes"])?).await
    }

    /// Fetches per-node process rankings from the `top` plugin endpoint.
    ///
    /// The endpoint is keyed by node name, so the node listing is fetched
    /// first and each node queried in turn.
    ///
    /// # Errors
    ///
    /// Returns an error if any request fails or a response cannot be
    /// parsed.
    pub async fn top(&self) -> Result<Vec<NodeTop>> {
        let mut tops = Vec::new();
        for node in self.nodes().await? {
            let top = self
                .get_json(self.endpoint(&["api", "top", &node.name])?)
                .await?;
            tops.push(top);
        }

        Ok(tops)
    }

    /// Returns details of the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// parsed.
    pub async fn whoami(&self) -> Result<Whoami> {
        self.get_json(self.endpoint(&["api", "whoami"])?).await
    }

    /// Lists open connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// parsed.
    pub async fn list_connections(&self) -> Result<Vec<Connection>> {
        self.get_json(self.endpoint(&["api", "connections"])?).await
    }

    /// Lists exchanges, either for one vhost or across all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// parsed.
    pub async fn list_exchanges(&self, vhost: &str, show_all: bool) -> Result<Vec<Exchange>> {
        let url = if show_all {
            self.endpoint(&["api", "exchanges"])?
        } else {
            self.endpoint(&["api", "exchanges", vhost])?
        };

        self.get_json(url).await
    }

    /// Lists queues, either for one vhost or across all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// parsed.
    pub async fn list_queues(&self, vhost: &str, show_all: bool) -> Result<Vec<Queue>> {
        let url = if show_all {
            self.endpoint(&["api", "queues"])?
        } else {
            self.endpoint(&["api", "queues", vhost])?
        };

        self.get_json(url).await
    }

    /// Lists broker users.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// parsed.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.get_json(self.endpoint(&["api", "users"])?).await
    }

    /// Lists virtual hosts.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// parsed.
    pub async fn list_virtual_hosts(&self) -> Result<Vec<VirtualHost>> {
        self.get_json(self.endpoint(&["api", "vhosts"])?).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .extend(segments);

        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("management API request: {}", url);

        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Api(status, body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ManagementClient {
        ManagementClient::new(ManagementClientOptions {
            api_url: "http://localhost:15672".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn config_command_defaults_to_canonical_name() {
        let client = client();

        assert_eq!(client.config_command_name().await, "CONFIG");
        assert_eq!(client.translate_config_command("CONFIG").await.unwrap(), "CONFIG");
    }

    #[tokio::test]
    async fn stale_config_command_name_is_rejected() {
        let client = client();
        client
            .set_config_command_name(Some("xK3fQ9".to_string()))
            .await;

        assert!(matches!(
            client.translate_config_command("CONFIG").await,
            Err(Error::CommandRejected)
        ));
        assert_eq!(client.translate_config_command("xK3fQ9").await.unwrap(), "CONFIG");
    }

    #[tokio::test]
    async fn clearing_the_alias_restores_the_default() {
        let client = client();
        client
            .set_config_command_name(Some("xK3fQ9".to_string()))
            .await;
        client.set_config_command_name(None).await;

        assert_eq!(client.config_command_name().await, "CONFIG");
    }

    #[test]
    fn vhost_path_segments_are_percent_encoded() {
        let client = client();
        let url = client.endpoint(&["api", "queues", "/"]).unwrap();

        assert_eq!(url.as_str(), "http://localhost:15672/api/queues/%2F");
    }
}
