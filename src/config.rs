//! Environment configuration data model (spec §3).
//!
//! `Deserialize`-derived the way the teacher's `settings.rs` models are, so a
//! downstream crate can still load these from YAML/JSON with `serde_yaml` or
//! `config` if it wants to — but `integr8` itself never touches the
//! filesystem. Construction here is purely via [`EnvironmentConfigBuilder`].
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::strategy::IsolationStrategy;
use crate::error::ConfigError;

/// Which of the four top-level lists a service was declared in. Determines
/// which [`crate::orchestrator::CategoryOrchestrator`] owns it and, for
/// `Database`, whether connection-string propagation applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Service,
    Database,
    Messaging,
    Storage,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Category::Service => "service",
            Category::Database => "database",
            Category::Messaging => "messaging",
            Category::Storage => "storage",
        };
        f.write_str(label)
    }
}

/// The level a service's piped stdout is logged at (spec §3: "`logging`:
/// level ∈ {debug, info, log, warn, error} or boolean"). `Log` has no direct
/// `tracing` counterpart and is treated as a synonym for `Info` — it exists
/// on the wire because a JS app under test's own `console.log` calls land at
/// that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Log,
    Warn,
    Error,
}

/// `logging` accepts either a boolean (on/off at the default level) or an
/// explicit level name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoggingSpec {
    Enabled(bool),
    Level(LogLevel),
}

/// A command run as a plain host process rather than inside a container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalSpec {
    pub command: String,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Host/container TCP port pair. `host: None` lets the engine pick an
/// ephemeral host port, which is the common case for test containers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortBinding {
    pub container: u16,
    #[serde(default)]
    pub host: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountMode {
    Ro,
    Rw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeBinding {
    pub host_path: String,
    pub container_path: String,
    #[serde(default = "default_mount_mode")]
    pub mode: MountMode,
}

fn default_mount_mode() -> MountMode {
    MountMode::Rw
}

/// Names of the env vars a container-backed database should populate once it
/// has a resolved host/port (spec §4.3). Any field left `None` is simply not
/// propagated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvMapping {
    pub host: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default)]
    pub ports: Vec<PortBinding>,
    #[serde(default)]
    pub volumes: Vec<VolumeBinding>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub env_mapping: Option<EnvMapping>,
}

fn default_interval_ms() -> u64 {
    500
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_retries() -> u32 {
    10
}

/// Either a command (exit 0 = ready) or an HTTP endpoint (2xx = ready). At
/// most one of the two is meaningful at a time; if both are set, `command`
/// takes precedence (matches the container runner's own readiness wiring,
/// which prefers an exec probe it can run without knowing the mapped port).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSpec {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for ReadinessSpec {
    fn default() -> Self {
        Self {
            command: None,
            endpoint: None,
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default = "default_category")]
    pub category: Category,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub local: Option<LocalSpec>,
    #[serde(default)]
    pub container: Option<ContainerSpec>,
    #[serde(default)]
    pub readiness: Option<ReadinessSpec>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub isolation: Option<IsolationStrategy>,
    #[serde(default)]
    pub logging: Option<LoggingSpec>,
}

fn default_category() -> Category {
    Category::Service
}

impl ServiceSpec {
    pub fn local(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: Category::Service,
            kind: String::new(),
            local: Some(LocalSpec {
                command: command.into(),
                ..Default::default()
            }),
            container: None,
            readiness: None,
            depends_on: Vec::new(),
            isolation: None,
            logging: None,
        }
    }

    pub fn container(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: Category::Service,
            kind: String::new(),
            local: None,
            container: Some(ContainerSpec {
                image: image.into(),
                ..Default::default()
            }),
            readiness: None,
            depends_on: Vec::new(),
            isolation: None,
            logging: None,
        }
    }

    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessSpec) -> Self {
        self.readiness = Some(readiness);
        self
    }

    pub fn with_isolation(mut self, strategy: IsolationStrategy) -> Self {
        self.isolation = Some(strategy);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_logging(mut self, logging: LoggingSpec) -> Self {
        self.logging = Some(logging);
        self
    }

    /// The level this service's piped output should be logged at, or `None`
    /// if `logging: false` turns forwarding off entirely. Defaults to
    /// `Info` when unset, matching the spec's "or boolean" default-on
    /// reading.
    pub fn log_level(&self) -> Option<LogLevel> {
        match self.logging {
            None | Some(LoggingSpec::Enabled(true)) => Some(LogLevel::Info),
            Some(LoggingSpec::Enabled(false)) => None,
            Some(LoggingSpec::Level(level)) => Some(level),
        }
    }

    /// A service must be exactly one of local or container-backed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local.is_some() == self.container.is_some() {
            return Err(ConfigError::AmbiguousMode(self.name.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestModeConfig {
    #[serde(default)]
    pub control_port: Option<u16>,
    #[serde(default)]
    pub override_endpoint: Option<String>,
    #[serde(default)]
    pub enable_fake_timers: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDiscoveryConfig {
    pub command: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub databases: Vec<ServiceSpec>,
    #[serde(default)]
    pub messaging: Vec<ServiceSpec>,
    #[serde(default)]
    pub storages: Vec<ServiceSpec>,
    #[serde(default)]
    pub test_timeout_ms: Option<u64>,
    #[serde(default)]
    pub setup_timeout_ms: Option<u64>,
    #[serde(default)]
    pub teardown_timeout_ms: Option<u64>,
    #[serde(default)]
    pub endpoint_discovery: Option<EndpointDiscoveryConfig>,
    #[serde(default)]
    pub test_mode: Option<TestModeConfig>,
}

impl EnvironmentConfig {
    pub fn builder() -> EnvironmentConfigBuilder {
        EnvironmentConfigBuilder::default()
    }

    /// All services across the four category lists, in declaration order.
    pub fn all_services(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services
            .iter()
            .chain(self.databases.iter())
            .chain(self.messaging.iter())
            .chain(self.storages.iter())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashMap::new();
        for spec in self.all_services() {
            spec.validate()?;
            if seen.insert(spec.name.clone(), ()).is_some() {
                return Err(ConfigError::DuplicateName(spec.name.clone()));
            }
        }
        let names: std::collections::HashSet<&str> =
            self.all_services().map(|s| s.name.as_str()).collect();
        for spec in self.all_services() {
            for dep in &spec.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        service: spec.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct EnvironmentConfigBuilder {
    config: EnvironmentConfig,
}

impl EnvironmentConfigBuilder {
    pub fn add_service(mut self, mut spec: ServiceSpec) -> Self {
        spec.category = Category::Service;
        self.config.services.push(spec);
        self
    }

    pub fn add_database(mut self, mut spec: ServiceSpec) -> Self {
        spec.category = Category::Database;
        self.config.databases.push(spec);
        self
    }

    pub fn add_messaging(mut self, mut spec: ServiceSpec) -> Self {
        spec.category = Category::Messaging;
        self.config.messaging.push(spec);
        self
    }

    pub fn add_storage(mut self, mut spec: ServiceSpec) -> Self {
        spec.category = Category::Storage;
        self.config.storages.push(spec);
        self
    }

    pub fn test_timeout_ms(mut self, ms: u64) -> Self {
        self.config.test_timeout_ms = Some(ms);
        self
    }

    pub fn setup_timeout_ms(mut self, ms: u64) -> Self {
        self.config.setup_timeout_ms = Some(ms);
        self
    }

    pub fn teardown_timeout_ms(mut self, ms: u64) -> Self {
        self.config.teardown_timeout_ms = Some(ms);
        self
    }

    pub fn endpoint_discovery(mut self, discovery: EndpointDiscoveryConfig) -> Self {
        self.config.endpoint_discovery = Some(discovery);
        self
    }

    pub fn test_mode(mut self, test_mode: TestModeConfig) -> Self {
        self.config.test_mode = Some(test_mode);
        self
    }

    pub fn build(self) -> Result<EnvironmentConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_names_across_categories() {
        let result = EnvironmentConfig::builder()
            .add_service(ServiceSpec::local("api", "node server.js"))
            .add_database(ServiceSpec::container("api", "postgres:16"))
            .build();
        assert!(matches!(result, Err(ConfigError::DuplicateName(name)) if name == "api"));
    }

    #[test]
    fn rejects_services_with_both_local_and_container() {
        let mut spec = ServiceSpec::local("api", "node server.js");
        spec.container = Some(ContainerSpec {
            image: "node:20".into(),
            ..Default::default()
        });
        let result = EnvironmentConfig::builder().add_service(spec).build();
        assert!(matches!(result, Err(ConfigError::AmbiguousMode(name)) if name == "api"));
    }

    #[test]
    fn rejects_unknown_dependencies() {
        let result = EnvironmentConfig::builder()
            .add_service(ServiceSpec::local("api", "node server.js").with_depends_on(["db"]))
            .build();
        assert!(matches!(result, Err(ConfigError::UnknownDependency{service, dependency}) if service == "api" && dependency == "db"));
    }

    #[test]
    fn accepts_a_well_formed_config() {
        let config = EnvironmentConfig::builder()
            .add_database(ServiceSpec::container("postgres", "postgres:16"))
            .add_service(
                ServiceSpec::local("api", "node server.js").with_depends_on(["postgres"]),
            )
            .build()
            .expect("valid config");
        assert_eq!(config.all_services().count(), 2);
    }

    #[test]
    fn log_level_defaults_to_info_when_unset() {
        let spec = ServiceSpec::local("api", "node server.js");
        assert_eq!(spec.log_level(), Some(LogLevel::Info));
    }

    #[test]
    fn log_level_true_means_the_default_level() {
        let spec = ServiceSpec::local("api", "node server.js").with_logging(LoggingSpec::Enabled(true));
        assert_eq!(spec.log_level(), Some(LogLevel::Info));
    }

    #[test]
    fn log_level_false_disables_forwarding() {
        let spec = ServiceSpec::local("api", "node server.js").with_logging(LoggingSpec::Enabled(false));
        assert_eq!(spec.log_level(), None);
    }

    #[test]
    fn log_level_honors_an_explicit_level() {
        let spec = ServiceSpec::local("api", "node server.js").with_logging(LoggingSpec::Level(LogLevel::Warn));
        assert_eq!(spec.log_level(), Some(LogLevel::Warn));
    }
}
