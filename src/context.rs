//! `TestContext` (spec §4.8): the object an individual test actually holds —
//! a worker-scoped handle onto the shared environment's connection strings,
//! database managers, override manager, and clock, plus a subscription
//! handle onto lifecycle events.
use std::collections::HashMap;
use std::sync::Arc;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::adapter::Adapter;
use crate::clock::ClockManager;
use crate::db::{DatabaseManager, IsolationStrategy};
use crate::error::{HttpError, IntegrError};
use crate::events::{EventBus, LifecycleEvent};
use crate::overrides::OverrideManager;

/// Per-worker HTTP façade onto the application under test (spec §2's "Test
/// Context / HTTP Client"). Built on `reqwest-middleware` so request tracing
/// composes the same way the teacher wires its own outbound OAuth2 client in
/// `examples/server/tests/mod.rs` (`ClientBuilder::new(..).with(..).build()`),
/// just with the tracing middleware actually enabled rather than commented out.
pub struct HttpClient {
    base_url: String,
    client: ClientWithMiddleware,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(TracingMiddleware::default())
            .build();
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response, HttpError> {
        Ok(self.client.get(self.url(path)).send().await?)
    }

    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response, HttpError> {
        Ok(self.client.post(self.url(path)).json(body).send().await?)
    }

    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response, HttpError> {
        Ok(self.client.put(self.url(path)).json(body).send().await?)
    }

    pub async fn patch<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response, HttpError> {
        Ok(self.client.patch(self.url(path)).json(body).send().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<reqwest::Response, HttpError> {
        Ok(self.client.delete(self.url(path)).send().await?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

pub struct TestContext {
    events: EventBus,
    connection_strings: HashMap<String, String>,
    databases: HashMap<String, DatabaseManager>,
    overrides: OverrideManager,
    clock: ClockManager,
    http: Option<HttpClient>,
}

impl TestContext {
    /// A context bound to a running [`crate::environment::EnvironmentOrchestrator`].
    pub fn attached(events: EventBus, connection_strings: HashMap<String, String>) -> Self {
        Self {
            events,
            connection_strings,
            databases: HashMap::new(),
            overrides: OverrideManager::new(None, None),
            clock: ClockManager::new(),
            http: None,
        }
    }

    /// A standalone context for unit-testing the harness itself, or for a
    /// test that only needs overrides/clock control and no running
    /// environment at all.
    pub fn detached() -> Self {
        Self {
            events: EventBus::new(),
            connection_strings: HashMap::new(),
            databases: HashMap::new(),
            overrides: OverrideManager::new(None, None),
            clock: ClockManager::new(),
            http: None,
        }
    }

    pub fn with_control_port(mut self, port: u16, override_endpoint: &str) -> Self {
        self.overrides = OverrideManager::new(Some(port), Some(override_endpoint));
        self
    }

    /// Binds this context's HTTP client to `base_url` (the resolved address
    /// of the default `service`-category unit, or the shared-environment
    /// fallback address).
    pub fn with_http_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.http = Some(HttpClient::new(base_url));
        self
    }

    /// The HTTP client façade onto the application under test, if one could
    /// be resolved. `None` when no `service`-category unit exposes a port
    /// (e.g. an environment made only of databases/messaging).
    pub fn http(&self) -> Option<&HttpClient> {
        self.http.as_ref()
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.overrides = self.overrides.with_adapter(adapter);
        self
    }

    pub fn connection_string(&self, name: &str) -> Option<&String> {
        self.connection_strings.get(name)
    }

    pub fn connection_strings(&self) -> &HashMap<String, String> {
        &self.connection_strings
    }

    /// Lazily connects and caches a per-worker `DatabaseManager` for
    /// `database_name`, using whichever connection string the environment
    /// resolved for it (expected under a `{DATABASE_NAME}_URL`-shaped key, or
    /// passed explicitly by the caller via `url`).
    pub async fn database(
        &mut self,
        database_name: &str,
        url: &str,
        strategy: IsolationStrategy,
        worker_id: &str,
    ) -> Result<&mut DatabaseManager, IntegrError> {
        if !self.databases.contains_key(database_name) {
            let manager = DatabaseManager::connect(url, strategy, worker_id).await?;
            self.databases.insert(database_name.to_string(), manager);
        }
        Ok(self.databases.get_mut(database_name).expect("just inserted"))
    }

    pub fn overrides(&mut self) -> &mut OverrideManager {
        &mut self.overrides
    }

    pub fn clock(&mut self) -> &mut ClockManager {
        &mut self.clock
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Tears down every database manager and clears overrides this context
    /// created. Called at the end of a test when running under per-test
    /// isolation.
    pub async fn cleanup(&mut self) {
        for (_, manager) in self.databases.iter_mut() {
            let _ = manager.reset().await;
        }
        self.overrides.clear_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_context_starts_with_no_connection_strings() {
        let context = TestContext::detached();
        assert!(context.connection_strings().is_empty());
    }

    #[tokio::test]
    async fn attached_context_exposes_resolved_connection_strings() {
        let mut strings = HashMap::new();
        strings.insert("DATABASE_URL".to_string(), "postgresql://test".to_string());
        let context = TestContext::attached(EventBus::new(), strings);
        assert_eq!(
            context.connection_string("DATABASE_URL"),
            Some(&"postgresql://test".to_string())
        );
    }

    #[test]
    fn context_has_no_http_client_until_a_base_url_is_bound() {
        let context = TestContext::detached();
        assert!(context.http().is_none());
    }

    #[test]
    fn http_client_joins_base_url_and_path_without_duplicating_the_slash() {
        let client = HttpClient::new("http://localhost:3000/");
        assert_eq!(client.url("/health"), "http://localhost:3000/health");
        assert_eq!(client.base_url(), "http://localhost:3000/");
    }

    #[test]
    fn context_exposes_the_http_client_once_bound() {
        let context = TestContext::detached().with_http_base_url("http://localhost:3000");
        assert_eq!(context.http().map(HttpClient::base_url), Some("http://localhost:3000"));
    }
}
