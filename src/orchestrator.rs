//! `CategoryOrchestrator` (spec §4.1/§4.2): owns every runner within one
//! category (services, databases, messaging, storages), starts/stops them,
//! publishes lifecycle events around each transition, and aggregates the
//! connection strings container-backed databases expose.
use std::collections::HashMap;

use crate::config::{Category, ServiceSpec};
use crate::connection_strings;
use crate::error::{ConnectionStringError, RunnerError};
use crate::events::{EventBus, LifecycleEvent};
use crate::runner::container::ContainerRunner;
use crate::runner::local::LocalRunner;
use crate::runner::Runner;

fn build_runner(spec: &ServiceSpec, injected_env: HashMap<String, String>) -> Result<Box<dyn Runner>, RunnerError> {
    match (&spec.local, &spec.container) {
        (Some(local), None) => Ok(Box::new(LocalRunner::new(spec.clone(), local.clone(), injected_env))),
        (None, Some(container)) => Ok(Box::new(ContainerRunner::new(spec.clone(), container.clone()))),
        _ => Err(RunnerError::Spawn {
            service: spec.name.clone(),
            reason: "service must configure exactly one of `local` or `container`".to_string(),
        }),
    }
}

pub struct CategoryOrchestrator {
    category: Category,
    specs: HashMap<String, ServiceSpec>,
    runners: HashMap<String, Box<dyn Runner>>,
    events: EventBus,
}

impl CategoryOrchestrator {
    pub fn new(category: Category, events: EventBus) -> Self {
        Self {
            category,
            specs: HashMap::new(),
            runners: HashMap::new(),
            events,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Starts `spec` with whatever connection-string env the caller has
    /// already resolved for its dependencies (typically this category's own
    /// prior database starts), publishing `Starting`/`Started`/`Failed`
    /// around the attempt.
    pub async fn start_service(
        &mut self,
        spec: ServiceSpec,
        injected_env: HashMap<String, String>,
        fast: bool,
    ) -> Result<(), RunnerError> {
        let name = spec.name.clone();
        self.events.publish(LifecycleEvent::Starting {
            service_name: name.clone(),
            service: spec.clone(),
        });

        let mut runner = build_runner(&spec, injected_env)?;
        if let Err(e) = runner.start(fast).await {
            self.events.publish(LifecycleEvent::Failed {
                service_name: name.clone(),
                service: spec.clone(),
                error: e.to_string(),
            });
            return Err(e);
        }

        self.runners.insert(name.clone(), runner);
        self.events.publish(LifecycleEvent::Started {
            service_name: name.clone(),
            service: spec.clone(),
        });
        self.specs.insert(name, spec);
        Ok(())
    }

    pub async fn stop_service(&mut self, name: &str) -> Result<(), RunnerError> {
        if !self.runners.contains_key(name) {
            return Ok(());
        }
        let Some(spec) = self.specs.get(name).cloned() else {
            return Ok(());
        };
        self.events.publish(LifecycleEvent::Stopping {
            service_name: name.to_string(),
            service: spec.clone(),
        });
        let runner = self.runners.get_mut(name).expect("checked above");
        runner.stop().await?;
        self.events.publish(LifecycleEvent::Stopped {
            service_name: name.to_string(),
            service: spec,
        });
        Ok(())
    }

    pub async fn stop_all(&mut self) -> Result<(), RunnerError> {
        let names: Vec<String> = self.runners.keys().cloned().collect();
        for name in names {
            self.stop_service(&name).await?;
        }
        Ok(())
    }

    pub async fn is_ready(&mut self, name: &str) -> bool {
        match self.runners.get_mut(name) {
            Some(runner) => runner.is_ready().await,
            None => false,
        }
    }

    pub fn connection_strings_for(&self, name: &str) -> HashMap<String, String> {
        self.runners
            .get(name)
            .map(|r| r.connection_strings())
            .unwrap_or_default()
    }

    pub fn http_base_url_for(&self, name: &str) -> Option<String> {
        self.runners.get(name).and_then(|r| r.http_base_url())
    }

    /// Aggregates connection strings across every runner in this category,
    /// failing if two services would produce conflicting env vars (spec
    /// §4.3's connection-string conflict detection, applied across the
    /// whole category rather than per-pair).
    pub fn aggregated_connection_strings(&self) -> Result<HashMap<String, String>, ConnectionStringError> {
        let per_service: Vec<(String, HashMap<String, String>)> = self
            .runners
            .iter()
            .map(|(name, runner)| (name.clone(), runner.connection_strings()))
            .collect();
        let maps: Vec<(&str, &HashMap<String, String>)> =
            per_service.iter().map(|(name, map)| (name.as_str(), map)).collect();
        connection_strings::merge(maps)
    }

    pub fn running_names(&self) -> Vec<String> {
        self.runners.keys().cloned().collect()
    }
}
