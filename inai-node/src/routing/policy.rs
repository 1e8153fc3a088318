// Policy Module
//
// INTENTION:
// Hold the per-service compiled matchers consulted by the dispatcher. A
// matcher is tested against a single line of the form
//
//     <service> <verb> <resid> <grouppat>
//
// where <grouppat> lists the caller's groups as `|g1|g2|...|gN|`. A service
// without a matcher is unrestricted.
//
// Policy rules (service, methods, resource pattern, groups) can be compiled
// into such a matcher with `compile_policies`; resource patterns are taken
// as regex fragments, service and group names are escaped.

use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const KNOWN_METHODS: [&str; 4] = ["get", "put", "post", "delete"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid policy pattern: {0}")]
    InvalidPattern(String),
    #[error("policy rule must name at least one method")]
    NoMethods,
    #[error("unknown method {0}")]
    UnknownMethod(String),
    #[error("policy rule must give a resource pattern")]
    NoResource,
    #[error("resource pattern cannot contain spaces")]
    ResourceWhitespace,
    #[error("policy rule must name at least one group")]
    NoGroups,
}

/// One access rule. A caller matches when it belongs to any of `groups`
/// and calls one of `methods` on a resource matching `resource`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Service the rule applies to; defaults to the service it is installed for
    #[serde(default)]
    pub service: Option<String>,
    pub methods: Vec<String>,
    pub resource: String,
    pub groups: Vec<String>,
}

fn escape_literal(s: &str) -> String {
    regex::escape(s)
}

fn compile_rule(service: &str, rule: &PolicyRule) -> Result<String, PolicyError> {
    if rule.methods.is_empty() {
        return Err(PolicyError::NoMethods);
    }
    if let Some(unknown) = rule
        .methods
        .iter()
        .find(|m| !KNOWN_METHODS.contains(&m.as_str()))
    {
        return Err(PolicyError::UnknownMethod(unknown.clone()));
    }
    if rule.resource.is_empty() {
        return Err(PolicyError::NoResource);
    }
    if rule.resource.chars().any(char::is_whitespace) {
        return Err(PolicyError::ResourceWhitespace);
    }
    if rule.groups.is_empty() {
        return Err(PolicyError::NoGroups);
    }

    let target = rule.service.as_deref().unwrap_or(service);
    let groups = rule
        .groups
        .iter()
        .map(|g| escape_literal(g))
        .collect::<Vec<_>>()
        .join("|");

    Ok(format!(
        r"(?:{}\s+(?:{})\s+{}\s+[^\s]*[|](?:{})[|])",
        escape_literal(target),
        rule.methods.join("|"),
        rule.resource,
        groups
    ))
}

/// Compile a set of rules into a single matcher pattern (alternatives joined by `|`).
pub fn compile_policies(service: &str, rules: &[PolicyRule]) -> Result<String, PolicyError> {
    let parts = rules
        .iter()
        .map(|rule| compile_rule(service, rule))
        .collect::<Result<Vec<_>, _>>()?;
    let pattern = parts.join("|");
    // Validate the resource fragments too.
    Regex::new(&pattern).map_err(|e| PolicyError::InvalidPattern(e.to_string()))?;
    Ok(pattern)
}

/// Build the `|g1|g2|...|` group pattern from an auth collaborator's body.
///
/// `groups` may be an array of names or an object whose truthy keys are names.
pub fn group_pattern(auth_body: Option<&Value>) -> String {
    let names: Vec<String> = match auth_body.and_then(|b| b.get("groups")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| !matches!(v, Value::Null | Value::Bool(false)))
            .map(|(k, _)| k.clone())
            .collect(),
        _ => Vec::new(),
    };

    let mut pattern = String::from("|");
    for name in names {
        pattern.push_str(&name);
        pattern.push('|');
    }
    pattern
}

/// The line a matcher is tested against.
pub fn match_line(service: &str, verb: &str, resid: &str, groups: &str) -> String {
    format!("{service} {verb} {resid} {groups}")
}

/// Service name -> compiled matcher.
#[derive(Debug, Default)]
pub struct PolicyTable {
    matchers: DashMap<String, Regex>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the matcher for a service.
    pub fn set(&self, service: &str, pattern: &str) -> Result<(), PolicyError> {
        let regex = Regex::new(pattern).map_err(|e| PolicyError::InvalidPattern(e.to_string()))?;
        self.matchers.insert(service.to_string(), regex);
        Ok(())
    }

    /// Remove the matcher for a service, making it unrestricted again.
    pub fn remove(&self, service: &str) -> bool {
        self.matchers.remove(service).is_some()
    }

    pub fn matcher(&self, service: &str) -> Option<Regex> {
        self.matchers.get(service).map(|r| r.value().clone())
    }

    /// Source pattern of an installed matcher.
    pub fn pattern(&self, service: &str) -> Option<String> {
        self.matchers.get(service).map(|r| r.as_str().to_string())
    }

    pub fn is_restricted(&self, service: &str) -> bool {
        self.matchers.contains_key(service)
    }

    pub fn services(&self) -> Vec<String> {
        self.matchers.iter().map(|e| e.key().clone()).collect()
    }
}
