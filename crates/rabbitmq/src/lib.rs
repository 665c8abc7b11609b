//! Guest-side lifecycle and configuration management for a managed RabbitMQ
//! instance.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

pub mod config;
mod error;
pub mod process;
pub mod status;

pub use error::{Error, Result};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{debug, info};
use warden_lifecycle::{ClusterUnsupported, Lifecycle, ServiceStatus};
use warden_rabbitmq_admin::{
    Connection, Exchange, ManagementClient, ManagementClientOptions, Node, NodeTop, Overview,
    Queue, User, VirtualHost, Whoami,
};

use config::{ConfigPatch, ConfigValue, ConfigurationManager, RENAME_COMMAND_KEY};
use process::{ProcessController, ServiceCommands, SystemdCommands};
use status::RabbitmqStatus;

/// Service account owning the broker's configuration.
pub const RABBITMQ_OWNER: &str = "rabbitmq";

/// Path of the broker's base configuration file.
pub const RABBITMQ_CONFIG: &str = "/etc/rabbitmq/rabbitmq.conf";

/// Path of the broker's pid file.
pub const RABBITMQ_PID_FILE: &str = "/var/run/rabbitmq/rabbitmq-server.pid";

/// Path of the broker's log file.
pub const RABBITMQ_LOG_FILE: &str = "/var/log/rabbitmq/rabbit.log";

/// Directory holding the broker's data.
pub const RABBITMQ_DATA_DIR: &str = "/var/lib/rabbitmq";

/// Process name used when force-killing a stalled broker.
pub const RABBITMQ_PROCESS_NAME: &str = "rabbitmq-server";

/// Service names tried in order when controlling the broker process.
pub const SERVICE_CANDIDATES: &[&str] = &["rabbitmq-server", "rabbitmqctl"];

/// Canonical name of the privileged configuration command.
const CONFIG_COMMAND: &str = "CONFIG";

/// Length of a generated command alias.
const ALIAS_LEN: usize = 16;

const DEFAULT_API_URL: &str = "http://localhost:15672";
const DEFAULT_API_USER: &str = "guest";

/// Options for configuring a [`RabbitmqService`].
pub struct RabbitmqServiceOptions {
    /// Path of the base configuration file.
    pub config_path: PathBuf,

    /// Account owning the configuration file, if ownership should be
    /// enforced on save.
    pub owner: Option<String>,

    /// Directory holding the override layer files. Defaults to an
    /// `overrides` subdirectory next to the base file.
    pub revision_dir: Option<PathBuf>,

    /// Service names tried in order when controlling the process.
    pub service_candidates: Vec<String>,

    /// How long to wait for a state change before timing out.
    pub state_change_wait: Duration,
}

impl Default for RabbitmqServiceOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(RABBITMQ_CONFIG),
            owner: Some(RABBITMQ_OWNER.to_string()),
            revision_dir: None,
            service_candidates: SERVICE_CANDIDATES
                .iter()
                .map(ToString::to_string)
                .collect(),
            state_change_wait: Duration::from_secs(180),
        }
    }
}

/// Orchestrates lifecycle and configuration of the broker on this host.
pub struct RabbitmqService<C: ServiceCommands = SystemdCommands> {
    admin: Arc<ManagementClient>,
    candidates: Vec<String>,
    cluster: ClusterUnsupported,
    configuration: ConfigurationManager,
    controller: ProcessController<C>,
    state_change_wait: Duration,
    status: Arc<RabbitmqStatus>,
}

impl RabbitmqService<SystemdCommands> {
    /// Creates a new `RabbitmqService` controlling the broker through
    /// systemd.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API URL in the effective
    /// configuration is invalid.
    pub fn new(options: RabbitmqServiceOptions) -> Result<Self> {
        Self::with_commands(options, SystemdCommands)
    }
}

impl<C: ServiceCommands> RabbitmqService<C> {
    /// Creates a new `RabbitmqService` over a custom OS command primitive.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API URL in the effective
    /// configuration is invalid.
    pub fn with_commands(
        RabbitmqServiceOptions {
            config_path,
            owner,
            revision_dir,
            service_candidates,
            state_change_wait,
        }: RabbitmqServiceOptions,
        commands: C,
    ) -> Result<Self> {
        let configuration = ConfigurationManager::new(config_path, revision_dir, owner);
        let admin = Arc::new(Self::build_admin_client(&configuration)?);
        let status = Arc::new(RabbitmqStatus::new(admin.clone()));

        Ok(Self {
            admin,
            candidates: service_candidates,
            cluster: ClusterUnsupported::new("rabbitmq"),
            configuration,
            controller: ProcessController::new(commands),
            state_change_wait,
            status,
        })
    }

    /// Builds the management API client from the effective configuration,
    /// falling back to defaults for anything unset.
    fn build_admin_client(configuration: &ConfigurationManager) -> Result<ManagementClient> {
        let property = |name: &str, default: &str| -> Result<String> {
            Ok(match configuration.get_value(name)? {
                Some(ConfigValue::Str(s)) => s,
                _ => default.to_string(),
            })
        };

        Ok(ManagementClient::new(ManagementClientOptions {
            api_url: property("api_url", DEFAULT_API_URL)?,
            username: property("username", DEFAULT_API_USER)?,
            password: property("requirepass", DEFAULT_API_USER)?,
        })?)
    }

    /// Returns the management API client.
    #[must_use]
    pub fn admin(&self) -> &Arc<ManagementClient> {
        &self.admin
    }

    /// Returns the status tracker.
    #[must_use]
    pub fn status_probe(&self) -> &Arc<RabbitmqStatus> {
        &self.status
    }

    /// Returns the configuration manager.
    #[must_use]
    pub const fn configuration_manager(&self) -> &ConfigurationManager {
        &self.configuration
    }

    /// Returns the clustering capability, which for this broker type is the
    /// explicit "not supported" variant.
    #[must_use]
    pub const fn cluster(&self) -> &ClusterUnsupported {
        &self.cluster
    }

    /// Saves a new base configuration and starts the broker with it.
    ///
    /// The guestagent-mandated system overrides and a freshly generated
    /// alias for the privileged configuration command are applied exactly
    /// once, before the process is started, so the broker never comes up
    /// with the command under its default name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the broker is currently running
    /// (the base configuration of a running instance cannot be hot-swapped);
    /// no file is written and no process control call is made in that case.
    /// Otherwise propagates configuration or start errors.
    pub async fn start_with_config_changes(&self, config_contents: &[u8]) -> Result<()> {
        let current = self.status.update().await;
        if matches!(current, ServiceStatus::Running | ServiceStatus::Building) {
            debug!("cannot start with config changes while status is {current}");
            return Err(Error::InvalidState(current));
        }

        info!("starting rabbitmq with new configuration");
        self.configuration.save_base(config_contents)?;
        self.apply_initial_guestagent_configuration().await?;
        self.start(true).await
    }

    /// Starts the broker, optionally enabling it at boot.
    ///
    /// # Errors
    ///
    /// Returns an error if no service candidate exists or the broker does
    /// not come up within the state-change wait time.
    pub async fn start(&self, enable_on_boot: bool) -> Result<()> {
        self.status.set(ServiceStatus::Building).await;

        let result = self
            .controller
            .start_service(
                self.status.as_ref(),
                &self.candidates,
                self.state_change_wait,
                enable_on_boot,
            )
            .await;

        match result {
            Ok(()) => {
                self.status.set(ServiceStatus::Running).await;
                Ok(())
            }
            Err(e) => {
                self.status.set(ServiceStatus::Crashed).await;
                Err(e)
            }
        }
    }

    /// Stops the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if no service candidate exists or the broker does
    /// not shut down within the state-change wait time.
    pub async fn stop(&self, do_not_start_on_reboot: bool) -> Result<()> {
        self.controller
            .stop_service(
                self.status.as_ref(),
                &self.candidates,
                self.state_change_wait,
                do_not_start_on_reboot,
            )
            .await?;

        self.status.set(ServiceStatus::Shutdown).await;

        Ok(())
    }

    /// Restarts the broker, with the state-change wait time applying to the
    /// stop and start phases separately.
    ///
    /// # Errors
    ///
    /// Returns any error of the stop or start phase.
    pub async fn restart(&self) -> Result<()> {
        self.status.set(ServiceStatus::Building).await;

        let result = self
            .controller
            .restart_service(
                self.status.as_ref(),
                &self.candidates,
                self.state_change_wait,
            )
            .await;

        match result {
            Ok(()) => {
                self.status.set(ServiceStatus::Running).await;
                Ok(())
            }
            Err(e) => {
                self.status.set(ServiceStatus::Crashed).await;
                Err(e)
            }
        }
    }

    /// Applies operator-supplied tunables to the user override layer.
    ///
    /// A no-op when the patch is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer cannot be persisted.
    pub fn apply_overrides(&self, overrides: &ConfigPatch) -> Result<()> {
        if overrides.is_empty() {
            return Ok(());
        }

        self.configuration.apply_user_override(overrides)
    }

    /// Sends SIGKILL to any stalled broker process, bypassing graceful
    /// shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill command cannot be issued.
    pub async fn kill_stalled(&self) -> Result<()> {
        self.controller.kill_stalled(RABBITMQ_PROCESS_NAME).await
    }

    /// Returns the value of a broker configuration property, with
    /// single-element lists unwrapped to their value.
    ///
    /// # Errors
    ///
    /// Returns an error if the effective configuration cannot be read.
    pub fn get_configuration_property(&self, name: &str) -> Result<Option<ConfigValue>> {
        self.configuration.get_value(name)
    }

    /// Returns the current alias of the privileged configuration command,
    /// if one has been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the effective configuration cannot be read.
    pub fn get_config_command_name(&self) -> Result<Option<String>> {
        let Some(value) = self.configuration.get_value(RENAME_COMMAND_KEY)? else {
            return Ok(None);
        };

        let pairs = match value {
            ConfigValue::List(items)
                if items.iter().all(|i| matches!(i, ConfigValue::List(_))) =>
            {
                items
            }
            single => vec![single],
        };

        for pair in pairs {
            if let ConfigValue::List(items) = pair {
                if let [ConfigValue::Str(old), ConfigValue::Str(new)] = items.as_slice() {
                    if old == CONFIG_COMMAND {
                        return Ok(Some(new.clone()));
                    }
                }
            }
        }

        Ok(None)
    }

    /// Applies the guestagent-controlled configuration properties.
    async fn apply_initial_guestagent_configuration(&self) -> Result<()> {
        // Hide the privileged command from end users by mangling its name.
        let alias = self.mangle_config_command_name()?;
        self.admin.set_config_command_name(Some(alias)).await;

        let mut patch = ConfigPatch::new();
        patch.insert("daemonize".to_string(), ConfigValue::Bool(true));
        patch.insert("protected-mode".to_string(), ConfigValue::Bool(false));
        patch.insert(
            "supervised".to_string(),
            ConfigValue::Str("systemd".to_string()),
        );
        patch.insert(
            "pidfile".to_string(),
            ConfigValue::Str(RABBITMQ_PID_FILE.to_string()),
        );
        patch.insert(
            "logfile".to_string(),
            ConfigValue::Str(RABBITMQ_LOG_FILE.to_string()),
        );
        patch.insert(
            "dir".to_string(),
            ConfigValue::Str(RABBITMQ_DATA_DIR.to_string()),
        );

        self.configuration.apply_system_override(&patch)
    }

    /// Renames the privileged configuration command to a random string
    /// known only to the guestagent, returning the new name.
    fn mangle_config_command_name(&self) -> Result<String> {
        let alias: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ALIAS_LEN)
            .map(char::from)
            .collect();

        self.rename_command(CONFIG_COMMAND, &alias)?;

        Ok(alias)
    }

    /// Renames a command in the system override layer. Renaming to an empty
    /// string disables the command entirely.
    fn rename_command(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut patch = ConfigPatch::new();
        patch.insert(
            RENAME_COMMAND_KEY.to_string(),
            ConfigValue::List(vec![
                ConfigValue::Str(old_name.to_string()),
                ConfigValue::Str(new_name.to_string()),
            ]),
        );

        self.configuration.apply_system_override(&patch)
    }

    /// Fetches broker overview information.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API call fails.
    pub async fn get_info(&self) -> Result<Overview> {
        Ok(self.admin.overview().await?)
    }

    /// Lists the nodes in the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API call fails.
    pub async fn get_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.admin.nodes().await?)
    }

    /// Fetches per-node process rankings.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API call fails.
    pub async fn get_top(&self) -> Result<Vec<NodeTop>> {
        Ok(self.admin.top().await?)
    }

    /// Returns details of the authenticated management user.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API call fails.
    pub async fn get_whoami(&self) -> Result<Whoami> {
        Ok(self.admin.whoami().await?)
    }

    /// Lists open connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API call fails.
    pub async fn list_connections(&self) -> Result<Vec<Connection>> {
        Ok(self.admin.list_connections().await?)
    }

    /// Lists exchanges for one vhost, or across all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API call fails.
    pub async fn list_exchanges(&self, virtual_host: &str, show_all: bool) -> Result<Vec<Exchange>> {
        Ok(self.admin.list_exchanges(virtual_host, show_all).await?)
    }

    /// Lists queues for one vhost, or across all of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API call fails.
    pub async fn list_queues(&self, virtual_host: &str, show_all: bool) -> Result<Vec<Queue>> {
        Ok(self.admin.list_queues(virtual_host, show_all).await?)
    }

    /// Lists broker users.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API call fails.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.admin.list_users().await?)
    }

    /// Lists virtual hosts.
    ///
    /// # Errors
    ///
    /// Returns an error if the management API call fails.
    pub async fn list_virtual_hosts(&self) -> Result<Vec<VirtualHost>> {
        Ok(self.admin.list_virtual_hosts().await?)
    }
}

#[async_trait]
impl<C: ServiceCommands> Lifecycle for RabbitmqService<C> {
    fn name(&self) -> &str {
        "rabbitmq"
    }

    async fn start(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Self::start(self, true).await.map_err(Into::into)
    }

    async fn stop(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Self::stop(self, false).await.map_err(Into::into)
    }

    async fn restart(&self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Self::restart(self).await.map_err(Into::into)
    }

    async fn status(&self) -> ServiceStatus {
        self.status.update().await
    }
}
