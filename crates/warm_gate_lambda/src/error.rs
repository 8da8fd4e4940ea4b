use thiserror::Error;

/// Failure of a function invocation issued through the invoke API.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to invoke {function_name}: {message}")]
    Sdk {
        function_name: String,
        message: String,
    },
    #[error("{function_name} returned function error {kind}: {payload}")]
    FunctionError {
        function_name: String,
        kind: String,
        payload: String,
    },
    #[error("failed to serialize invocation payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single smoke-test probe. Always counted as a failed test.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("probe request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid probe request: {0}")]
    InvalidRequest(String),
    #[error("invalid response pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("failed to sign probe request: {0}")]
    Signing(String),
}

/// Failure reported by the backing host; handed to the caller unchanged.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("backing host request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("invalid backing host request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Error)]
#[error("failed to report {status} for deployment {deployment_id} hook {hook_execution_id}: {message}")]
pub struct ReportError {
    pub deployment_id: String,
    pub hook_execution_id: String,
    pub status: String,
    pub message: String,
}
