//! Declarative smoke tests: manifest loading, probe construction and response
//! evaluation. Dispatching probes is left to the runtime crate.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contract::{Headers, LifecycleStatus, PING_HOST, PROBE_MARKER_HEADER};

pub const DEFAULT_MANIFEST_PATH: &str = "smoketests.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SmokeTest {
    #[serde(alias = "Path")]
    pub path: String,
    #[serde(alias = "Method")]
    pub method: String,
    #[serde(default, alias = "Body", skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(alias = "ResponsePattern")]
    pub response_pattern: String,
    #[serde(default, alias = "NoProxy")]
    pub no_proxy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// Invoke the candidate function version directly.
    Direct,
    /// Call the live base URL; traffic has already shifted.
    PublicEndpoint,
}

impl TargetMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::PublicEndpoint => "public_endpoint",
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read smoke test manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed smoke test manifest: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn load_manifest(path: &Path) -> Result<Vec<SmokeTest>, ManifestError> {
    let raw = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&raw)
}

pub fn parse_manifest(raw: &str) -> Result<Vec<SmokeTest>, ManifestError> {
    Ok(serde_json::from_str(raw)?)
}

/// Outbound request for one smoke test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub body: Option<String>,
}

impl ProbeRequest {
    pub fn for_test(test: &SmokeTest, mode: TargetMode) -> Self {
        Self {
            method: test.method.clone(),
            path: probe_path(test, mode),
            headers: Headers::from([
                ("Host".to_string(), PING_HOST.to_string()),
                (PROBE_MARKER_HEADER.to_string(), "true".to_string()),
            ]),
            body: test.body.clone().filter(|body| !body.is_empty()),
        }
    }
}

/// Path the probe is sent to. Direct invocations bypass the public endpoint,
/// so its stage segment is dropped unless the test opts out with `noProxy`.
pub fn probe_path(test: &SmokeTest, mode: TargetMode) -> String {
    match mode {
        TargetMode::Direct if !test.no_proxy => strip_first_segment(&test.path),
        _ => test.path.clone(),
    }
}

pub fn strip_first_segment(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .skip(1)
        .collect::<Vec<_>>()
        .join("/")
}

/// What a probe got back.
///
/// `body` is the application response body. Direct invocations also keep the
/// full invoke payload in `payload`, so patterns written against the proxy
/// envelope (`"statusCode":200`) still match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    pub body: String,
    pub payload: Option<String>,
}

impl ProbeResponse {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Unanchored search for `pattern` in the body, then in the full payload.
    pub fn matches(&self, pattern: &str) -> Result<bool, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(regex.is_match(&self.body)
            || self
                .payload
                .as_deref()
                .is_some_and(|payload| regex.is_match(payload)))
    }
}

/// Result of a single smoke test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub method: String,
    pub path: String,
    pub passed: bool,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn matched(request: &ProbeRequest, passed: bool) -> Self {
        Self {
            method: request.method.clone(),
            path: request.path.clone(),
            passed,
            error: None,
        }
    }

    pub fn errored(request: &ProbeRequest, error: impl Into<String>) -> Self {
        Self {
            method: request.method.clone(),
            path: request.path.clone(),
            passed: false,
            error: Some(error.into()),
        }
    }
}

/// Succeeded only when every test passed; an empty suite passes.
pub fn aggregate_status(outcomes: &[ProbeOutcome]) -> LifecycleStatus {
    if outcomes.iter().all(|outcome| outcome.passed) {
        LifecycleStatus::Succeeded
    } else {
        LifecycleStatus::Failed
    }
}
