use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const CONCURRENCY_HEADER: &str = "__CONCURRENCY__";
pub const KEEP_ALIVE_HEADER: &str = "__KEEP_ALIVE_INVOCATION__";
pub const CORRELATION_HEADER: &str = "mh-correlation-id";
pub const PROBE_MARKER_HEADER: &str = "__PRE_TRAFFIC_HOOK__";
pub const PING_PATH: &str = "/ping";
pub const PING_HOST: &str = "localhost";

pub type Headers = BTreeMap<String, String>;

/// API Gateway proxy request as it arrives at the entry function.
///
/// Fields the dispatcher does not interpret are kept in `extra` so that
/// application traffic reaches the backing host exactly as it was delivered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, alias = "Headers", deserialize_with = "null_as_default")]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_context: Option<RequestContext>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Gateway request context (stage, authorizer, identity). Opaque here, kept
/// so it reaches the backing host unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestContext {
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InvocationEvent {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    pub fn method(&self) -> Option<&str> {
        self.http_method.as_deref().filter(|method| !method.is_empty())
    }

    /// Whether `body` carries base64-encoded binary content.
    pub fn is_base64_encoded(&self) -> bool {
        self.extra
            .get("isBase64Encoded")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Rewrite a control event into the synthetic health request that forces
    /// the backing host to finish initializing.
    pub fn into_ping(mut self) -> Self {
        self.http_method = Some("GET".to_string());
        self.path = Some(PING_PATH.to_string());
        self.headers = Headers::from([("Host".to_string(), PING_HOST.to_string())]);
        self.request_context = Some(RequestContext::default());
        self
    }

    /// Payload used for self-invocations that keep sibling environments busy.
    pub fn keep_alive() -> Self {
        Self {
            headers: Headers::from([(KEEP_ALIVE_HEADER.to_string(), "1".to_string())]),
            ..Self::default()
        }
    }
}

/// API Gateway proxy response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Headers,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl ProxyResponse {
    /// Answer to a control invocation once the environment is warm.
    pub fn empty_success() -> Self {
        Self {
            status_code: 200,
            ..Self::default()
        }
    }

    pub fn json(status_code: u16, body: &Value) -> Self {
        Self {
            status_code,
            headers: Headers::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]),
            body: body.to_string(),
            is_base64_encoded: false,
        }
    }
}

/// Lifecycle hook event delivered by the deployment orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentHookEvent {
    #[serde(rename = "DeploymentId", alias = "deploymentId")]
    pub deployment_id: String,
    #[serde(
        rename = "LifecycleEventHookExecutionId",
        alias = "hookExecutionId",
        alias = "lifecycleEventHookExecutionId"
    )]
    pub hook_execution_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecycleStatus {
    Succeeded,
    Failed,
}

impl LifecycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
