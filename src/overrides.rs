//! Override Manager (spec §4.5): replaces a module/service/repository/auth
//! identity for the duration of a test, delivered either in-process (via a
//! registered [`crate::adapter::Adapter`]) or over the HTTP control port the
//! application under test exposes in test mode.
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::adapter::Adapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverrideType {
    Module,
    Service,
    Repository,
    DataSource,
    Provider,
    Middleware,
    Auth,
}

/// How the replacement value is delivered. JS test harnesses can stringify a
/// mock function and ship it over HTTP; Rust closures can't be serialized, so
/// in-process adapters receive the boxed value directly and HTTP delivery is
/// restricted to plain values or an opaque function-source string the
/// application under test interprets itself.
pub enum OverrideImplementation {
    Value(serde_json::Value),
    FunctionSource(String),
    InProcess(Arc<dyn Any + Send + Sync>),
}

impl std::fmt::Debug for OverrideImplementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverrideImplementation::Value(v) => f.debug_tuple("Value").field(v).finish(),
            OverrideImplementation::FunctionSource(s) => f.debug_tuple("FunctionSource").field(s).finish(),
            OverrideImplementation::InProcess(_) => f.write_str("InProcess(..)"),
        }
    }
}

#[derive(Debug)]
pub struct OverrideRecord {
    pub target: String,
    pub kind: OverrideType,
    pub implementation: OverrideImplementation,
}

/// Wire envelope for the HTTP override side channel (spec §6): `{type, name,
/// implementation}`, where `implementation` is either the raw value or, for
/// a mocked function, `{type:"function", source:<string>}`.
#[derive(Serialize)]
struct WireOverride<'a> {
    #[serde(rename = "type")]
    kind: OverrideType,
    name: &'a str,
    implementation: WireImplementation<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireImplementation<'a> {
    Value(&'a serde_json::Value),
    Function(WireFunction<'a>),
}

#[derive(Serialize)]
struct WireFunction<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    source: &'a str,
}

pub struct OverrideManager {
    control_url: Option<String>,
    adapter: Option<Arc<dyn Adapter>>,
    http: reqwest::Client,
    active: Vec<String>,
}

impl OverrideManager {
    pub fn new(control_port: Option<u16>, override_endpoint: Option<&str>) -> Self {
        let control_url = match (control_port, override_endpoint) {
            (Some(port), Some(endpoint)) => Some(format!("http://127.0.0.1:{port}{endpoint}")),
            _ => None,
        };
        Self {
            control_url,
            adapter: None,
            http: reqwest::Client::new(),
            active: Vec::new(),
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Applies an override. In-process delivery is tried first when an
    /// adapter is registered; otherwise this falls back to the HTTP control
    /// port. Delivery failures are logged, not raised — the override store
    /// stays consistent with what the test requested even if the app under
    /// test never received it, matching the spec's "the test continues"
    /// behavior.
    pub async fn apply_override(&mut self, record: OverrideRecord) {
        self.active.push(record.target.clone());

        if let Some(adapter) = &self.adapter {
            if let OverrideImplementation::InProcess(_) | OverrideImplementation::Value(_) = &record.implementation {
                match adapter.apply_override(&record).await {
                    Ok(()) => return,
                    Err(e) => warn!("in-process override of '{}' rejected: {e}", record.target),
                }
            }
        }

        let Some(url) = &self.control_url else {
            warn!(
                "no adapter and no control port configured; override of '{}' was recorded but not delivered",
                record.target
            );
            return;
        };

        let implementation = match &record.implementation {
            OverrideImplementation::Value(v) => WireImplementation::Value(v),
            OverrideImplementation::FunctionSource(s) => WireImplementation::Function(WireFunction {
                kind: "function",
                source: s.as_str(),
            }),
            OverrideImplementation::InProcess(_) => {
                warn!(
                    "override of '{}' is in-process only but no adapter is registered; skipping HTTP delivery",
                    record.target
                );
                return;
            }
        };

        let wire = WireOverride {
            kind: record.kind,
            name: &record.target,
            implementation,
        };

        if let Err(e) = self.http.post(url).json(&wire).send().await {
            warn!("failed to deliver override of '{}' over control port: {e}", record.target);
        }
    }

    /// Clears every override applied through this manager.
    pub async fn clear_all(&mut self) {
        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.clear().await {
                warn!("failed to clear in-process overrides: {e}");
            }
        }
        if let Some(url) = &self.control_url {
            if let Err(e) = self.http.post(format!("{url}/clear")).send().await {
                warn!("failed to clear overrides over control port: {e}");
            }
        }
        self.active.clear();
    }

    pub fn active_targets(&self) -> &[String] {
        &self.active
    }
}

pub struct OverrideBuilder {
    target: String,
    kind: OverrideType,
}

impl OverrideBuilder {
    pub fn new(target: impl Into<String>, kind: OverrideType) -> Self {
        Self {
            target: target.into(),
            kind,
        }
    }

    pub fn with_value(self, value: serde_json::Value) -> OverrideRecord {
        OverrideRecord {
            target: self.target,
            kind: self.kind,
            implementation: OverrideImplementation::Value(value),
        }
    }

    pub fn with_mock(self, source: impl Into<String>) -> OverrideRecord {
        OverrideRecord {
            target: self.target,
            kind: self.kind,
            implementation: OverrideImplementation::FunctionSource(source.into()),
        }
    }

    pub fn with(self, value: Arc<dyn Any + Send + Sync>) -> OverrideRecord {
        OverrideRecord {
            target: self.target,
            kind: self.kind,
            implementation: OverrideImplementation::InProcess(value),
        }
    }
}

/// Auth-specific sugar (spec §4.5: "override the authenticated identity for
/// a test") built on top of `OverrideBuilder` with `OverrideType::Auth`.
pub struct AuthOverrideBuilder {
    profile: HashMap<String, serde_json::Value>,
}

impl AuthOverrideBuilder {
    pub fn new() -> Self {
        Self {
            profile: HashMap::new(),
        }
    }

    pub fn with_users(mut self, users: Vec<serde_json::Value>) -> Self {
        self.profile.insert("users".to_string(), serde_json::Value::Array(users));
        self
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.profile.insert(
            "roles".to_string(),
            serde_json::Value::Array(roles.into_iter().map(serde_json::Value::String).collect()),
        );
        self
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.profile.insert(
            "permissions".to_string(),
            serde_json::Value::Array(permissions.into_iter().map(serde_json::Value::String).collect()),
        );
        self
    }

    pub fn with_profile(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.profile.insert(key.into(), value);
        self
    }

    pub fn with_mock_auth(self, source: impl Into<String>) -> OverrideRecord {
        OverrideBuilder::new("auth", OverrideType::Auth).with_mock(source)
    }

    pub fn as_admin(self) -> OverrideRecord {
        self.with_roles(vec!["admin".to_string()]).build()
    }

    pub fn as_user(self) -> OverrideRecord {
        self.with_roles(vec!["user".to_string()]).build()
    }

    pub fn as_guest(self) -> OverrideRecord {
        self.with_roles(vec!["guest".to_string()]).build()
    }

    fn build(self) -> OverrideRecord {
        OverrideBuilder::new("auth", OverrideType::Auth).with_value(serde_json::Value::Object(
            self.profile.into_iter().collect(),
        ))
    }
}

impl Default for AuthOverrideBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectingAdapter;

    #[async_trait::async_trait]
    impl Adapter for RejectingAdapter {
        async fn apply_override(&self, _record: &OverrideRecord) -> Result<(), crate::error::OverrideError> {
            Err(crate::error::OverrideError::Rejected("nope".to_string()))
        }

        async fn clear(&self) -> Result<(), crate::error::OverrideError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn records_an_override_even_when_no_delivery_channel_is_configured() {
        let mut manager = OverrideManager::new(None, None);
        let record = OverrideBuilder::new("payments.gateway", OverrideType::Service)
            .with_value(serde_json::json!({"mode": "sandbox"}));
        manager.apply_override(record).await;
        assert_eq!(manager.active_targets(), &["payments.gateway".to_string()]);
    }

    #[tokio::test]
    async fn falls_back_gracefully_when_adapter_rejects_without_control_port() {
        let mut manager = OverrideManager::new(None, None).with_adapter(Arc::new(RejectingAdapter));
        let record = OverrideBuilder::new("users.repo", OverrideType::Repository)
            .with_value(serde_json::json!({"empty": true}));
        manager.apply_override(record).await;
        assert_eq!(manager.active_targets(), &["users.repo".to_string()]);
    }

    #[test]
    fn wire_envelope_matches_the_documented_shape_for_a_value() {
        let value = serde_json::json!({"mode": "sandbox"});
        let wire = WireOverride {
            kind: OverrideType::Service,
            name: "payments.gateway",
            implementation: WireImplementation::Value(&value),
        };
        assert_eq!(
            serde_json::to_value(&wire).expect("serializes"),
            serde_json::json!({"type": "service", "name": "payments.gateway", "implementation": {"mode": "sandbox"}})
        );
    }

    #[test]
    fn wire_envelope_wraps_a_mocked_function_with_its_source() {
        let wire = WireOverride {
            kind: OverrideType::Repository,
            name: "users.repo",
            implementation: WireImplementation::Function(WireFunction {
                kind: "function",
                source: "() => ({ findById: () => ({ id: 1 }) })",
            }),
        };
        assert_eq!(
            serde_json::to_value(&wire).expect("serializes"),
            serde_json::json!({
                "type": "repository",
                "name": "users.repo",
                "implementation": {"type": "function", "source": "() => ({ findById: () => ({ id: 1 }) })"},
            })
        );
    }

    #[test]
    fn override_type_serializes_as_camel_case() {
        assert_eq!(serde_json::to_value(OverrideType::DataSource).expect("serializes"), "dataSource");
    }

    #[test]
    fn auth_builder_produces_a_role_list() {
        let record = AuthOverrideBuilder::new().as_admin();
        match record.implementation {
            OverrideImplementation::Value(serde_json::Value::Object(map)) => {
                assert_eq!(map["roles"], serde_json::json!(["admin"]));
            }
            other => panic!("expected a value override, got {other:?}"),
        }
    }
}
