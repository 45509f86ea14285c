//! Shared Docker engine client.
//!
//! Grounded in the teacher's `test.rs`, which reaches for `bollard` directly
//! (through `testcontainers::bollard`) whenever it needs to do something the
//! `testcontainers` builder API doesn't expose — there, removing containers
//! left running across test binaries; here, `docker exec` for command-based
//! readiness probes against a running container.
use std::sync::OnceLock;
use testcontainers::bollard::Docker;

static DOCKER: OnceLock<Docker> = OnceLock::new();

/// Returns the process-wide Docker client, connecting lazily on first use.
pub(crate) fn client() -> &'static Docker {
    DOCKER.get_or_init(|| {
        Docker::connect_with_defaults().expect("failed to connect to Docker daemon")
    })
}
