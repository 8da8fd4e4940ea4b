use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Method, Url};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use warm_gate_core::contract::{Headers, InvocationEvent, ProxyResponse};

use crate::adapters::host::BackingHost;
use crate::error::HostError;

const SKIPPED_REQUEST_HEADERS: [&str; 2] = ["host", "content-length"];

/// Backing host that relays proxy requests to an HTTP server running next to
/// the function (for example an application listening on localhost).
#[derive(Debug, Clone)]
pub struct ForwardingHost {
    client: Client,
    upstream: Url,
}

impl ForwardingHost {
    pub fn new(upstream: &str, request_timeout: Duration) -> Result<Self, HostError> {
        let upstream = Url::parse(upstream)
            .map_err(|error| HostError::InvalidRequest(format!("{upstream}: {error}")))?;
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, upstream })
    }

    pub fn url_for(&self, event: &InvocationEvent) -> Result<Url, HostError> {
        let path = event.path.as_deref().unwrap_or("/");
        let mut url = self
            .upstream
            .join(path)
            .map_err(|error| HostError::InvalidRequest(format!("{path}: {error}")))?;

        if let Some(Value::Object(params)) = event
            .extra
            .get("queryStringParameters")
            .filter(|params| params.as_object().is_some_and(|map| !map.is_empty()))
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params {
                if let Some(value) = value.as_str() {
                    pairs.append_pair(name, value);
                }
            }
        }
        Ok(url)
    }

    async fn forward(&self, event: InvocationEvent) -> Result<ProxyResponse, HostError> {
        let method_name = event.method().unwrap_or("GET").to_ascii_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|error| HostError::InvalidRequest(format!("{method_name}: {error}")))?;
        let url = self.url_for(&event)?;

        let mut builder = self.client.request(method, url);
        for (name, value) in &event.headers {
            if SKIPPED_REQUEST_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request_body(&event)? {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status_code = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect::<Headers>();
        let (body, is_base64_encoded) = response_body(response.bytes().await?.to_vec());

        Ok(ProxyResponse {
            status_code,
            headers,
            body,
            is_base64_encoded,
        })
    }
}

/// Raw request bytes; gateway-encoded binary bodies are decoded first.
fn request_body(event: &InvocationEvent) -> Result<Option<Vec<u8>>, HostError> {
    let Some(body) = event.body.as_deref() else {
        return Ok(None);
    };
    if !event.is_base64_encoded() {
        return Ok(Some(body.as_bytes().to_vec()));
    }
    BASE64
        .decode(body)
        .map(Some)
        .map_err(|error| HostError::InvalidRequest(format!("base64 request body: {error}")))
}

/// UTF-8 bodies pass through as text; anything else goes back base64-encoded.
fn response_body(bytes: Vec<u8>) -> (String, bool) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, false),
        Err(error) => (BASE64.encode(error.into_bytes()), true),
    }
}

#[async_trait]
impl BackingHost for ForwardingHost {
    async fn handle(
        &self,
        event: InvocationEvent,
        cancel: CancellationToken,
    ) -> Result<ProxyResponse, HostError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(
                    component = "forwarding_host",
                    event = "soft_deadline_exceeded",
                    "aborting upstream request"
                );
                Ok(ProxyResponse::json(
                    504,
                    &json!({
                        "error": "deadline_exceeded",
                        "message": "request aborted before the function timeout",
                    }),
                ))
            }
            response = self.forward(event) => response,
        }
    }
}
