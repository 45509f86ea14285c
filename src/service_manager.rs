//! `ServiceManager` (spec §4.1/§4.2): resolves `depends_on` into a start
//! order, detects cycles, and drives the four `CategoryOrchestrator`s through
//! a dependency-respecting start/stop sequence.
use std::collections::HashMap;

use crate::config::{Category, EnvironmentConfig, ServiceSpec};
use crate::error::{ConfigError, RunnerError, SchedulerError};
use crate::events::EventBus;
use crate::orchestrator::CategoryOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Depth-first topological sort with deterministic tie-breaking.
/// `HashMap` iteration order isn't stable, so `order` tracks declaration
/// order separately and drives which unvisited node DFS picks next.
fn topological_order(specs: &HashMap<String, ServiceSpec>, order: &[String]) -> Result<Vec<String>, ConfigError> {
    let mut color: HashMap<&str, Color> = order.iter().map(|n| (n.as_str(), Color::White)).collect();
    let mut stack: Vec<String> = Vec::new();
    let mut result = Vec::with_capacity(order.len());

    fn visit<'a>(
        name: &'a str,
        specs: &'a HashMap<String, ServiceSpec>,
        color: &mut HashMap<&'a str, Color>,
        stack: &mut Vec<String>,
        result: &mut Vec<String>,
    ) -> Result<(), ConfigError> {
        match color.get(name) {
            Some(Color::Black) => return Ok(()),
            Some(Color::Gray) => {
                stack.push(name.to_string());
                return Err(ConfigError::Cycle(stack.join(" -> ")));
            }
            _ => {}
        }

        color.insert(name, Color::Gray);
        stack.push(name.to_string());

        if let Some(spec) = specs.get(name) {
            for dep in &spec.depends_on {
                visit(dep, specs, color, stack, result)?;
            }
        }

        stack.pop();
        color.insert(name, Color::Black);
        result.push(name.to_string());
        Ok(())
    }

    for name in order {
        visit(name, specs, &mut color, &mut stack, &mut result)?;
    }

    Ok(result)
}

pub struct ServiceManager {
    specs: HashMap<String, ServiceSpec>,
    order: Vec<String>,
    databases: CategoryOrchestrator,
    messaging: CategoryOrchestrator,
    storages: CategoryOrchestrator,
    services: CategoryOrchestrator,
}

impl ServiceManager {
    pub fn new(config: &EnvironmentConfig, events: EventBus) -> Result<Self, SchedulerError> {
        config.validate()?;

        let mut specs = HashMap::new();
        let mut order = Vec::new();
        for spec in config.all_services() {
            order.push(spec.name.clone());
            specs.insert(spec.name.clone(), spec.clone());
        }

        // Validate the dependency graph up front so a cycle surfaces at
        // construction time, not on the first `start_all`.
        topological_order(&specs, &order)?;

        Ok(Self {
            specs,
            order,
            databases: CategoryOrchestrator::new(Category::Database, events.clone()),
            messaging: CategoryOrchestrator::new(Category::Messaging, events.clone()),
            storages: CategoryOrchestrator::new(Category::Storage, events.clone()),
            services: CategoryOrchestrator::new(Category::Service, events),
        })
    }

    fn orchestrator_for(&mut self, category: Category) -> &mut CategoryOrchestrator {
        match category {
            Category::Database => &mut self.databases,
            Category::Messaging => &mut self.messaging,
            Category::Storage => &mut self.storages,
            Category::Service => &mut self.services,
        }
    }

    fn orchestrator_for_ref(&self, category: Category) -> &CategoryOrchestrator {
        match category {
            Category::Database => &self.databases,
            Category::Messaging => &self.messaging,
            Category::Storage => &self.storages,
            Category::Service => &self.services,
        }
    }

    /// Env vars a service should inherit from the databases/messaging/storage
    /// it depends on, aggregated across categories.
    fn injected_env_for(&self, spec: &ServiceSpec) -> HashMap<String, String> {
        let mut env = HashMap::new();
        for dep in &spec.depends_on {
            for category in [Category::Database, Category::Messaging, Category::Storage] {
                env.extend(self.orchestrator_for_ref(category).connection_strings_for(dep));
            }
        }
        env
    }

    pub async fn start_all(&mut self, fast: bool) -> Result<(), SchedulerError> {
        let order = topological_order(&self.specs, &self.order).map_err(SchedulerError::Config)?;
        for name in order {
            self.start_one(&name, fast).await?;
        }
        Ok(())
    }

    pub async fn start_one(&mut self, name: &str, fast: bool) -> Result<(), SchedulerError> {
        let spec = self
            .specs
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownService(name.to_string()))?;

        for dep in &spec.depends_on {
            let ready = self.is_ready(dep).await;
            if !ready {
                return Err(SchedulerError::DependencyNotReady {
                    service: name.to_string(),
                    dependency: dep.clone(),
                });
            }
        }

        let injected_env = self.injected_env_for(&spec);
        let category = spec.category;
        self.orchestrator_for(category)
            .start_service(spec, injected_env, fast)
            .await
            .map_err(|e| SchedulerError::UnknownService(format!("{name}: {e}")))?;
        Ok(())
    }

    pub async fn stop_all(&mut self) -> Result<(), RunnerError> {
        // Stop in reverse dependency order: services first, then the
        // infrastructure they depended on.
        self.services.stop_all().await?;
        self.messaging.stop_all().await?;
        self.storages.stop_all().await?;
        self.databases.stop_all().await?;
        Ok(())
    }

    pub async fn is_ready(&mut self, name: &str) -> bool {
        let Some(spec) = self.specs.get(name).cloned() else {
            return false;
        };
        self.orchestrator_for(spec.category).is_ready(name).await
    }

    pub fn aggregated_connection_strings(&self) -> HashMap<String, String> {
        let mut merged = HashMap::new();
        for category in [Category::Database, Category::Messaging, Category::Storage] {
            if let Ok(map) = self.orchestrator_for_ref(category).aggregated_connection_strings() {
                merged.extend(map);
            }
        }
        merged
    }

    pub fn service_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// The first `service`-category unit in declaration order — the
    /// conventional default target for a test's HTTP client when it doesn't
    /// name one explicitly.
    pub fn first_service_name(&self) -> Option<String> {
        self.order
            .iter()
            .find(|name| self.specs.get(*name).is_some_and(|s| s.category == Category::Service))
            .cloned()
    }

    /// Base URL a test's HTTP client should use to reach the named
    /// `service`-category unit, once started (spec §4.1's "Test Context /
    /// HTTP Client").
    pub fn http_base_url(&self, name: &str) -> Option<String> {
        self.services.http_base_url_for(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config_with(specs: Vec<ServiceSpec>) -> EnvironmentConfig {
        let mut builder = EnvironmentConfig::builder();
        for spec in specs {
            builder = match spec.category {
                Category::Database => builder.add_database(spec),
                Category::Messaging => builder.add_messaging(spec),
                Category::Storage => builder.add_storage(spec),
                Category::Service => builder.add_service(spec),
            };
        }
        builder.build().expect("valid config")
    }

    #[test]
    fn orders_dependencies_before_dependents() {
        let mut specs = HashMap::new();
        let mut order = Vec::new();
        for spec in [
            ServiceSpec::container("postgres", "postgres:16"),
            ServiceSpec::local("api", "node server.js").with_depends_on(["postgres"]),
        ] {
            order.push(spec.name.clone());
            specs.insert(spec.name.clone(), spec);
        }

        let sorted = topological_order(&specs, &order).expect("no cycle");
        let postgres_index = sorted.iter().position(|n| n == "postgres").unwrap();
        let api_index = sorted.iter().position(|n| n == "api").unwrap();
        assert!(postgres_index < api_index);
    }

    #[test]
    fn detects_a_cycle() {
        let mut specs = HashMap::new();
        let mut order = Vec::new();
        for spec in [
            ServiceSpec::local("a", "true").with_depends_on(["b"]),
            ServiceSpec::local("b", "true").with_depends_on(["a"]),
        ] {
            order.push(spec.name.clone());
            specs.insert(spec.name.clone(), spec);
        }

        let result = topological_order(&specs, &order);
        assert!(matches!(result, Err(ConfigError::Cycle(_))));
    }

    #[test]
    fn constructing_a_manager_with_a_cycle_fails_fast() {
        let config = config_with(vec![
            ServiceSpec::local("a", "true").with_depends_on(["b"]),
            ServiceSpec::local("b", "true").with_depends_on(["a"]),
        ]);
        let result = ServiceManager::new(&config, EventBus::new());
        assert!(result.is_err());
    }
}
