use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use warm_gate_core::contract::{Headers, InvocationEvent, ProxyResponse, PROBE_MARKER_HEADER};
use warm_gate_core::smoke::{ProbeRequest, ProbeResponse};

use crate::adapters::invoke::{FunctionInvoker, InvokeRequest};
use crate::error::{InvokeError, ProbeError};

/// Sends one smoke-test probe and returns what came back.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn send(&self, request: &ProbeRequest) -> Result<ProbeResponse, ProbeError>;
}

/// Adds authentication headers to an outbound HTTP probe.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// Headers to add for `method url` with the given headers and body.
    async fn sign(
        &self,
        method: &Method,
        url: &Url,
        headers: &Headers,
        body: &[u8],
    ) -> Result<Headers, ProbeError>;
}

/// Probes a specific function version through the invoke API, bypassing every
/// public route to it.
pub struct DirectProbeTransport {
    invoker: Arc<dyn FunctionInvoker>,
    function_name: String,
    qualifier: Option<String>,
}

impl DirectProbeTransport {
    pub fn new(
        invoker: Arc<dyn FunctionInvoker>,
        function_name: impl Into<String>,
        qualifier: Option<String>,
    ) -> Self {
        Self {
            invoker,
            function_name: function_name.into(),
            qualifier,
        }
    }
}

#[async_trait]
impl ProbeTransport for DirectProbeTransport {
    async fn send(&self, request: &ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        let event = InvocationEvent {
            http_method: Some(request.method.clone()),
            path: Some(request.path.clone()),
            headers: request.headers.clone(),
            body: request.body.clone(),
            ..InvocationEvent::default()
        };
        let payload = serde_json::to_vec(&event).map_err(InvokeError::from)?;
        let invoke_request = InvokeRequest::new(self.function_name.clone(), payload)
            .with_qualifier(self.qualifier.clone());

        let response = self.invoker.invoke(invoke_request).await?;
        Ok(direct_response(&response))
    }
}

/// Body of the proxy response in `payload` plus the payload itself. A payload
/// that is not a proxy response is its own body.
fn direct_response(payload: &[u8]) -> ProbeResponse {
    let raw = String::from_utf8_lossy(payload).into_owned();
    match serde_json::from_slice::<ProxyResponse>(payload) {
        Ok(response) => ProbeResponse::text(response.body).with_payload(raw),
        Err(_) => ProbeResponse::text(raw),
    }
}

/// HTTP request ready to send, after signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedProbe {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Option<String>,
}

/// Probes the live public endpoint over HTTP, optionally signing each request.
pub struct HttpProbeTransport {
    client: Client,
    base_url: Url,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl HttpProbeTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProbeError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| ProbeError::InvalidRequest(format!("{base_url}: {error}")))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            signer: None,
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn url_for(&self, path: &str) -> Result<Url, ProbeError> {
        self.base_url
            .join(path)
            .map_err(|error| ProbeError::InvalidRequest(format!("{path}: {error}")))
    }

    pub async fn prepare(&self, request: &ProbeRequest) -> Result<PreparedProbe, ProbeError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|error| ProbeError::InvalidRequest(format!("{}: {error}", request.method)))?;
        let url = self.url_for(&request.path)?;

        // The live endpoint sets its own Host; only the marker travels.
        let mut headers =
            Headers::from([(PROBE_MARKER_HEADER.to_string(), "true".to_string())]);
        if let Some(signer) = &self.signer {
            let body = request.body.as_deref().unwrap_or_default().as_bytes();
            let signed = signer.sign(&method, &url, &headers, body).await?;
            headers.extend(signed);
        }

        Ok(PreparedProbe {
            method,
            url,
            headers,
            body: request.body.clone(),
        })
    }
}

#[async_trait]
impl ProbeTransport for HttpProbeTransport {
    async fn send(&self, request: &ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        let prepared = self.prepare(request).await?;

        let mut builder = self.client.request(prepared.method, prepared.url);
        for (name, value) in &prepared.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = prepared.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        Ok(ProbeResponse::text(response.text().await?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use warm_gate_core::smoke::{SmokeTest, TargetMode};

    use super::*;

    struct CannedInvoker {
        payload: Vec<u8>,
        requests: Mutex<Vec<InvokeRequest>>,
    }

    #[async_trait]
    impl FunctionInvoker for CannedInvoker {
        async fn invoke(
            &self,
            request: InvokeRequest,
        ) -> Result<Vec<u8>, InvokeError> {
            self.requests.lock().expect("poisoned mutex").push(request);
            Ok(self.payload.clone())
        }
    }

    fn sample_request() -> ProbeRequest {
        ProbeRequest::for_test(
            &SmokeTest {
                path: "/stage/v1/x".to_string(),
                method: "GET".to_string(),
                body: None,
                response_pattern: "ok".to_string(),
                no_proxy: false,
            },
            TargetMode::Direct,
        )
    }

    #[tokio::test]
    async fn direct_probe_invokes_candidate_version_with_proxy_event() {
        let invoker = Arc::new(CannedInvoker {
            payload: serde_json::to_vec(&json!({
                "statusCode": 200,
                "headers": {},
                "body": "{\"ok\":true}"
            }))
            .expect("payload"),
            requests: Mutex::new(Vec::new()),
        });
        let transport =
            DirectProbeTransport::new(invoker.clone(), "orders-api", Some("7".to_string()));

        let response = transport.send(&sample_request()).await.expect("probe");
        assert_eq!(response.body, "{\"ok\":true}");
        assert!(response
            .payload
            .as_deref()
            .is_some_and(|payload| payload.contains("\"statusCode\":200")));

        let requests = invoker.requests.lock().expect("poisoned mutex");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].function_name, "orders-api");
        assert_eq!(requests[0].qualifier.as_deref(), Some("7"));

        let sent: InvocationEvent =
            serde_json::from_slice(&requests[0].payload).expect("event payload");
        assert_eq!(sent.method(), Some("GET"));
        assert_eq!(sent.path.as_deref(), Some("v1/x"));
        assert_eq!(sent.header(PROBE_MARKER_HEADER), Some("true"));
    }

    #[tokio::test]
    async fn direct_probe_falls_back_to_raw_payload() {
        let invoker = Arc::new(CannedInvoker {
            payload: b"\"plain\"".to_vec(),
            requests: Mutex::new(Vec::new()),
        });
        let transport = DirectProbeTransport::new(invoker, "orders-api", None);

        let response = transport.send(&sample_request()).await.expect("probe");
        assert_eq!(response, ProbeResponse::text("\"plain\""));
    }

    #[test]
    fn http_probe_resolves_paths_against_base_url() {
        let transport = HttpProbeTransport::new(
            "https://api.example.com/prod/",
            Duration::from_secs(1),
        )
        .expect("transport");

        assert_eq!(
            transport.url_for("v1/x").expect("url").as_str(),
            "https://api.example.com/prod/v1/x"
        );
        assert_eq!(
            transport.url_for("/prod/v1/x").expect("url").as_str(),
            "https://api.example.com/prod/v1/x"
        );
    }

    struct FixedSigner {
        seen: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    #[async_trait]
    impl RequestSigner for FixedSigner {
        async fn sign(
            &self,
            method: &Method,
            url: &Url,
            _headers: &Headers,
            body: &[u8],
        ) -> Result<Headers, ProbeError> {
            self.seen.lock().expect("poisoned mutex").push((
                method.to_string(),
                url.to_string(),
                body.to_vec(),
            ));
            Ok(Headers::from([(
                "authorization".to_string(),
                "AWS4-HMAC-SHA256 Credential=test".to_string(),
            )]))
        }
    }

    #[tokio::test]
    async fn unsigned_http_request_carries_only_marker_header() {
        let transport =
            HttpProbeTransport::new("https://api.example.com/", Duration::from_secs(1))
                .expect("transport");
        let request = ProbeRequest::for_test(
            &SmokeTest {
                path: "/prod/health".to_string(),
                method: "get".to_string(),
                body: None,
                response_pattern: "up".to_string(),
                no_proxy: false,
            },
            TargetMode::PublicEndpoint,
        );

        let prepared = transport.prepare(&request).await.expect("prepared");
        assert_eq!(prepared.method, Method::GET);
        assert_eq!(prepared.url.as_str(), "https://api.example.com/prod/health");
        assert_eq!(
            prepared.headers,
            Headers::from([(PROBE_MARKER_HEADER.to_string(), "true".to_string())])
        );
    }

    #[tokio::test]
    async fn signer_headers_are_added_to_http_request() {
        let signer = Arc::new(FixedSigner {
            seen: Mutex::new(Vec::new()),
        });
        let transport =
            HttpProbeTransport::new("https://api.example.com/", Duration::from_secs(1))
                .expect("transport")
                .with_signer(signer.clone());
        let request = ProbeRequest::for_test(
            &SmokeTest {
                path: "/prod/orders".to_string(),
                method: "POST".to_string(),
                body: Some("{\"sku\":\"A-1\"}".to_string()),
                response_pattern: "created".to_string(),
                no_proxy: false,
            },
            TargetMode::PublicEndpoint,
        );

        let prepared = transport.prepare(&request).await.expect("prepared");

        assert_eq!(
            prepared.headers.get("authorization").map(String::as_str),
            Some("AWS4-HMAC-SHA256 Credential=test")
        );
        assert_eq!(
            prepared.headers.get(PROBE_MARKER_HEADER).map(String::as_str),
            Some("true")
        );
        let seen = signer.seen.lock().expect("poisoned mutex");
        assert_eq!(
            *seen,
            vec![(
                "POST".to_string(),
                "https://api.example.com/prod/orders".to_string(),
                b"{\"sku\":\"A-1\"}".to_vec(),
            )]
        );
    }

    #[test]
    fn http_probe_rejects_invalid_base_url() {
        assert!(HttpProbeTransport::new("not a url", Duration::from_secs(1)).is_err());
    }
}
