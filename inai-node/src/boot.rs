// Boot Manifest Module
//
// INTENTION:
// Describe the services a node should start and where their code comes
// from, so the registry and code store (which are in-memory only) can be
// rebuilt on every process start by replaying a manifest. The replay itself
// is `Node::boot_from_manifest`; this module holds the data types, the
// codebase collaborator contract and the environment-variable expansion
// applied to every string of a service spec before it is booted.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// How to start one named service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Name to bind the booted instance to; unnamed services are only reachable by address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub code_id: String,
    /// Body of the `boot` call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default)]
    pub disabled: bool,
    /// Profiles this service runs in; empty means every profile
    #[serde(default)]
    pub env: Vec<String>,
    /// Whether an ingress layer may expose the service
    #[serde(default)]
    pub public: bool,
}

impl ServiceSpec {
    pub fn new(code_id: impl Into<String>) -> Self {
        Self {
            name: None,
            code_id: code_id.into(),
            config: None,
            disabled: false,
            env: Vec::new(),
            public: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_env(mut self, profile: impl Into<String>) -> Self {
        self.env.push(profile.into());
        self
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Whether this service should run on a node with `profile`.
    pub fn is_for_profile(&self, profile: &str) -> bool {
        self.env.is_empty() || self.env.iter().any(|p| p == profile)
    }

    /// Name used in logs and boot results
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.code_id)
    }
}

/// Ordered list of service names to start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BootManifest {
    #[serde(default)]
    pub start: Vec<String>,
}

impl BootManifest {
    pub fn new(start: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            start: start.into_iter().map(Into::into).collect(),
        }
    }
}

/// Persistent codebase the boot sequence reads specs and source text from
#[async_trait]
pub trait Codebase: Send + Sync {
    /// Spec of a named service
    async fn named(&self, name: &str) -> Result<ServiceSpec>;

    /// Source text of a code id
    async fn code(&self, code_id: &str) -> Result<String>;
}

/// In-memory `Codebase`
#[derive(Debug, Default)]
pub struct InMemoryCodebase {
    specs: DashMap<String, ServiceSpec>,
    sources: DashMap<String, String>,
}

impl InMemoryCodebase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named spec. The spec's own `name` is set to `name`.
    pub fn add_spec(&self, name: impl Into<String>, spec: ServiceSpec) {
        let name = name.into();
        let spec = ServiceSpec {
            name: Some(name.clone()),
            ..spec
        };
        self.specs.insert(name, spec);
    }

    pub fn add_code(&self, code_id: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(code_id.into(), source.into());
    }
}

#[async_trait]
impl Codebase for InMemoryCodebase {
    async fn named(&self, name: &str) -> Result<ServiceSpec> {
        self.specs
            .get(name)
            .map(|s| s.value().clone())
            .ok_or_else(|| anyhow!("no service named '{name}' in codebase"))
    }

    async fn code(&self, code_id: &str) -> Result<String> {
        self.sources
            .get(code_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| anyhow!("no code '{code_id}' in codebase"))
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$([A-Z_0-9]+)").expect("static pattern"))
}

/// Replace `$VAR` references in every string of `value`.
///
/// References `lookup` cannot resolve are left untouched and reported in
/// the returned list of missing variable names.
pub fn resolve_env_vars<F>(value: &Value, lookup: &F) -> (Value, Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();
    let resolved = resolve_value(value, lookup, &mut missing);
    (resolved, missing)
}

fn resolve_value<F>(value: &Value, lookup: &F, missing: &mut Vec<String>) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => Value::String(resolve_str(s, lookup, missing)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_value(item, lookup, missing))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, lookup, missing)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_str<F>(s: &str, lookup: &F, missing: &mut Vec<String>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    env_var_pattern()
        .replace_all(s, |caps: &Captures| {
            let name = &caps[1];
            match lookup(name) {
                Some(value) => value,
                None => {
                    missing.push(name.to_string());
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

/// `spec` with `$VAR` references in any of its string fields resolved with `lookup`.
pub fn resolve_spec_vars<F>(spec: &ServiceSpec, lookup: &F) -> Result<(ServiceSpec, Vec<String>)>
where
    F: Fn(&str) -> Option<String>,
{
    let encoded = serde_json::to_value(spec)?;
    let (resolved, missing) = resolve_env_vars(&encoded, lookup);
    Ok((serde_json::from_value(resolved)?, missing))
}

/// `spec` with `$VAR` references resolved from the process environment.
pub fn resolve_spec_env(spec: &ServiceSpec) -> Result<(ServiceSpec, Vec<String>)> {
    resolve_spec_vars(spec, &|name: &str| std::env::var(name).ok())
}
