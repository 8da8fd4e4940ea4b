use async_trait::async_trait;

use crate::error::InvokeError;

/// Synchronous (request/response) invocation of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    pub function_name: String,
    pub qualifier: Option<String>,
    pub payload: Vec<u8>,
}

impl InvokeRequest {
    pub fn new(function_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            function_name: function_name.into(),
            qualifier: None,
            payload,
        }
    }

    pub fn with_qualifier(mut self, qualifier: Option<String>) -> Self {
        self.qualifier = qualifier;
        self
    }
}

#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// Invoke and wait for the function to finish, returning its response payload.
    async fn invoke(&self, request: InvokeRequest) -> Result<Vec<u8>, InvokeError>;
}
