//! Container runner, built directly on the `testcontainers`/`GenericImage`
//! API the teacher's `test.rs::containers::{postgres, keycloak}` already
//! uses — generalized from two hand-written container-starter functions to
//! one data-driven runner keyed off `ContainerSpec`.
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use testcontainers::core::ports::IntoContainerPort;
use testcontainers::core::wait::HttpWaitStrategy;
use testcontainers::core::{Mount, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tracing::{info, warn};

use crate::config::{ContainerSpec, ReadinessSpec, ServiceSpec};
use crate::connection_strings;
use crate::error::RunnerError;
use crate::readiness;
use crate::util::split_command;

use super::Runner;

/// Docker network every container-backed runner joins, so container-to-
/// container traffic (when a containerized service talks to a containerized
/// database) can resolve peers by name rather than by host-mapped port.
const NETWORK: &str = "integr8-test-network";

pub struct ContainerRunner {
    spec: ServiceSpec,
    container_spec: ContainerSpec,
    handle: Option<ContainerAsync<GenericImage>>,
    connection_strings: HashMap<String, String>,
    http_base_url: Option<String>,
}

impl ContainerRunner {
    pub fn new(spec: ServiceSpec, container_spec: ContainerSpec) -> Self {
        Self {
            spec,
            container_spec,
            handle: None,
            connection_strings: HashMap::new(),
            http_base_url: None,
        }
    }
}

fn split_image(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) => (name, tag),
        None => (image, "latest"),
    }
}

async fn exec_check(container_id: &str, command: &str) -> bool {
    use testcontainers::bollard::exec::CreateExecOptions;

    let tokens = split_command(command);
    let docker = crate::docker::client();
    let exec = match docker
        .create_exec(
            container_id,
            CreateExecOptions {
                cmd: Some(tokens),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            },
        )
        .await
    {
        Ok(exec) => exec,
        Err(e) => {
            warn!("failed to create exec for readiness check: {e}");
            return false;
        }
    };

    if let Err(e) = docker.start_exec(&exec.id, None).await {
        warn!("failed to start exec for readiness check: {e}");
        return false;
    }

    match docker.inspect_exec(&exec.id).await {
        Ok(inspect) => inspect.exit_code == Some(0),
        Err(e) => {
            warn!("failed to inspect exec result for readiness check: {e}");
            false
        }
    }
}

async fn probe_readiness(
    readiness: &ReadinessSpec,
    container_id: &str,
    host: &str,
    canonical_port: Option<u16>,
    service: &str,
) -> bool {
    if let Some(command) = readiness.command.clone() {
        let container_id = container_id.to_string();
        readiness::probe(
            move || {
                let container_id = container_id.clone();
                let command = command.clone();
                async move { exec_check(&container_id, &command).await }
            },
            readiness,
            service,
        )
        .await
    } else if let (Some(endpoint), Some(port)) = (readiness.endpoint.clone(), canonical_port) {
        let url = format!("http://{host}:{port}{endpoint}");
        readiness::probe(
            move || {
                let url = url.clone();
                async move { readiness::http_check(&url).await }
            },
            readiness,
            service,
        )
        .await
    } else {
        warn!(service, "no usable readiness check for container; assuming ready");
        true
    }
}

#[async_trait]
impl Runner for ContainerRunner {
    async fn start(&mut self, fast: bool) -> Result<(), RunnerError> {
        let (name, tag) = split_image(&self.container_spec.image);
        let mut image = GenericImage::new(name, tag);

        for binding in &self.container_spec.ports {
            image = image.with_exposed_port(binding.container.tcp());
        }
        for (key, value) in &self.container_spec.env {
            image = image.with_env_var(key, value);
        }

        let timeout_ms = self
            .spec
            .readiness
            .as_ref()
            .map(|r| r.timeout_ms)
            .unwrap_or(30_000);
        let mut image = image.with_startup_timeout(Duration::from_millis(timeout_ms));

        if !fast {
            if let Some(readiness) = &self.spec.readiness {
                if let (Some(endpoint), Some(canonical)) =
                    (&readiness.endpoint, self.container_spec.ports.first())
                {
                    image = image.with_wait_for(WaitFor::http(
                        HttpWaitStrategy::new(endpoint.clone())
                            .with_port(canonical.container.tcp())
                            .with_expected_status_code(200u16),
                    ));
                }
            }
        }

        for volume in &self.container_spec.volumes {
            // TODO: pin read-only mounts once `Mount` exposes an access-mode
            // setter on the pinned testcontainers version; every mount is
            // read-write for now regardless of `VolumeBinding::mode`.
            let mount = Mount::bind_mount(volume.host_path.clone(), volume.container_path.clone());
            image = image.with_mount(mount);
        }

        let image = image
            .with_network(NETWORK)
            .with_network_aliases(vec![self.spec.name.clone()]);

        let container = image.start().await.map_err(|e| RunnerError::ContainerStart {
            service: self.spec.name.clone(),
            reason: e.to_string(),
        })?;

        if self.container_spec.env_mapping.is_some() {
            if let Some(canonical) = self.container_spec.ports.first() {
                let host = container
                    .get_host()
                    .await
                    .map_err(|e| RunnerError::Engine {
                        service: self.spec.name.clone(),
                        reason: e.to_string(),
                    })?
                    .to_string();
                let mapped = container
                    .get_host_port_ipv4(canonical.container)
                    .await
                    .map_err(|e| RunnerError::Engine {
                        service: self.spec.name.clone(),
                        reason: e.to_string(),
                    })?;
                self.connection_strings =
                    connection_strings::compute(&self.spec, &self.container_spec, &host, mapped)
                        .map_err(|e| RunnerError::Engine {
                            service: self.spec.name.clone(),
                            reason: e.to_string(),
                        })?;
            } else {
                warn!(service = %self.spec.name, "env_mapping configured but no ports exposed; nothing to propagate");
            }
        }

        if let Some(canonical) = self.container_spec.ports.first() {
            match (container.get_host().await, container.get_host_port_ipv4(canonical.container).await) {
                (Ok(host), Ok(mapped)) => {
                    self.http_base_url = Some(format!("http://{host}:{mapped}"));
                }
                _ => warn!(service = %self.spec.name, "could not resolve a host/port for the HTTP client base URL"),
            }
        }

        info!(service = %self.spec.name, container_id = %container.id(), "container started");
        self.handle = Some(container);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RunnerError> {
        let Some(container) = self.handle.take() else {
            return Ok(());
        };
        if let Err(e) = container.stop().await {
            warn!(service = %self.spec.name, "container stop reported an error (ignored): {e}");
        }
        Ok(())
    }

    async fn is_ready(&mut self) -> bool {
        let Some(container) = &self.handle else {
            return false;
        };
        let Some(readiness) = self.spec.readiness.clone() else {
            return true;
        };

        let host = match container.get_host().await {
            Ok(host) => host.to_string(),
            Err(_) => return false,
        };
        let canonical_port = match self.container_spec.ports.first() {
            Some(binding) => container.get_host_port_ipv4(binding.container).await.ok(),
            None => None,
        };

        probe_readiness(&readiness, &container.id().to_string(), &host, canonical_port, &self.spec.name).await
    }

    fn connection_strings(&self) -> HashMap<String, String> {
        self.connection_strings.clone()
    }

    fn http_base_url(&self) -> Option<String> {
        self.http_base_url.clone()
    }
}
