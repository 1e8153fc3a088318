// Routing Module
//
// INTENTION:
// Define the uniform call shape every component of the node uses to talk to
// every other component: a verb-based request addressed by service name and
// resource id, answered by a status-coded response. Bodies, queries and
// headers are opaque JSON values; handlers deserialize what they need.

pub mod policy;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::services::ServiceAddress;

/// Prefix reserved for the runtime's own pseudo-services.
pub const INTERNAL_PREFIX: char = '_';

/// Names starting with `_` address pseudo-services and are never logged.
pub fn is_internal_service(service: &str) -> bool {
    service.starts_with(INTERNAL_PREFIX)
}

/// A request travelling through the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Service name or direct instance address
    pub service: String,
    /// Operation kind, e.g. `get`, `post`, `boot`
    pub verb: String,
    /// Resource within the service the request targets
    pub resid: String,
    #[serde(default)]
    pub query: Option<Value>,
    #[serde(default)]
    pub headers: Option<Value>,
    #[serde(default)]
    pub body: Option<Value>,
    /// Address of the calling instance, `None` for calls from outside the mesh
    #[serde(default)]
    pub caller: Option<ServiceAddress>,
}

impl Request {
    pub fn new(
        service: impl Into<String>,
        verb: impl Into<String>,
        resid: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            verb: verb.into(),
            resid: resid.into(),
            query: None,
            headers: None,
            body: None,
            caller: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<Option<Value>>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_headers(mut self, headers: impl Into<Option<Value>>) -> Self {
        self.headers = headers.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<Option<Value>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_caller(mut self, caller: impl Into<Option<ServiceAddress>>) -> Self {
        self.caller = caller.into();
        self
    }

    /// Look up a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&Value> {
        self.query.as_ref().and_then(|q| q.get(key))
    }

    /// Query parameter interpreted as a flag (`true`, `"true"`, `1`, `"1"`).
    pub fn query_flag(&self, key: &str) -> bool {
        match self.query_param(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true" || s == "1",
            Some(Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }

    /// Query parameter as a string slice.
    pub fn query_str(&self, key: &str) -> Option<&str> {
        self.query_param(key).and_then(Value::as_str)
    }

    /// Header value as a string slice. Header names are matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        let headers = self.headers.as_ref()?.as_object()?;
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_str())
    }

    /// Resource id without its leading `/`.
    pub fn trimmed_resid(&self) -> &str {
        self.resid.trim_start_matches('/')
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.verb, self.service, self.resid)
    }
}

/// Response to a dispatched request. Status follows HTTP conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            headers: None,
            body: None,
        }
    }

    pub fn ok(body: impl Into<Value>) -> Self {
        Self::with_status(200).with_body(body)
    }

    pub fn ok_empty() -> Self {
        Self::with_status(200)
    }

    pub fn not_found() -> Self {
        Self::with_status(404)
    }

    pub fn bad_request(explanation: impl Into<String>) -> Self {
        Self::with_status(400).with_body(explanation.into())
    }

    pub fn forbidden(explanation: impl Into<String>) -> Self {
        Self::with_status(403).with_body(explanation.into())
    }

    pub fn server_error(explanation: impl Into<String>) -> Self {
        Self::with_status(503).with_body(explanation.into())
    }

    /// Fixed answer for verbs an instance does not implement.
    pub fn unsupported_verb(verb: &str) -> Self {
        Self::with_status(400).with_body(format!("Verb [{verb}] not supported"))
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as a string slice, if it is a JSON string.
    pub fn body_str(&self) -> Option<&str> {
        self.body.as_ref().and_then(Value::as_str)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Some(body) => write!(f, "{} {}", self.status, body),
            None => write!(f, "{}", self.status),
        }
    }
}
