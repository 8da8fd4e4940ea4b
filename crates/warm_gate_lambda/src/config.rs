//! Environment-driven settings shared by the entry function and the hooks.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use warm_gate_core::smoke::DEFAULT_MANIFEST_PATH;

pub const TARGET_FUNCTION_VAR: &str = "LambdaToInvoke";
pub const OWN_FUNCTION_VAR: &str = "AWS_LAMBDA_FUNCTION_NAME";
pub const FUNCTION_VERSION_VAR: &str = "AWS_LAMBDA_FUNCTION_VERSION";
pub const API_BASE_URL_VAR: &str = "ApiBaseUrl";
pub const VERSION_TO_TEST_VAR: &str = "VersionToTest";
pub const MANIFEST_PATH_VAR: &str = "SMOKE_TEST_MANIFEST";
pub const BACKING_HOST_URL_VAR: &str = "BACKING_HOST_URL";
pub const ENABLE_FAN_OUT_VAR: &str = "ENABLE_CONCURRENCY_FAN_OUT";
pub const ENABLE_GATE_VAR: &str = "ENABLE_DEPLOYMENT_GATE";
pub const FAN_OUT_JOIN_TIMEOUT_VAR: &str = "FAN_OUT_JOIN_TIMEOUT_MS";
pub const KEEP_ALIVE_PAUSE_VAR: &str = "KEEP_ALIVE_PAUSE_MS";
pub const PROBE_TIMEOUT_VAR: &str = "PROBE_TIMEOUT_MS";
pub const SIGN_PROBES_VAR: &str = "SIGN_PUBLIC_PROBES";
pub const SIGNING_SERVICE_VAR: &str = "PROBE_SIGNING_SERVICE";

pub const DEFAULT_BACKING_HOST_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_FAN_OUT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_KEEP_ALIVE_PAUSE: Duration = Duration::from_millis(75);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SIGNING_SERVICE: &str = "execute-api";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("{name} has invalid value '{value}': expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Function invoked for fan-out and direct probes.
    pub target_function: String,
    pub function_version: Option<String>,
    pub api_base_url: Option<String>,
    pub version_to_test: Option<String>,
    pub manifest_path: PathBuf,
    pub backing_host_url: String,
    pub enable_concurrency_fan_out: bool,
    pub enable_deployment_gate: bool,
    pub fan_out_join_timeout: Duration,
    pub keep_alive_pause: Duration,
    pub probe_timeout: Duration,
    /// SigV4-sign public-endpoint probes (IAM-authorized APIs).
    pub sign_public_probes: bool,
    pub signing_service: String,
}

/// Function name and optional qualifier addressing the version under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTarget {
    pub function_name: String,
    pub qualifier: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let target_function = read(TARGET_FUNCTION_VAR)
            .or_else(|| read(OWN_FUNCTION_VAR))
            .ok_or(ConfigError::Missing(TARGET_FUNCTION_VAR))?;

        Ok(Self {
            target_function,
            function_version: read(FUNCTION_VERSION_VAR),
            api_base_url: read(API_BASE_URL_VAR),
            version_to_test: read(VERSION_TO_TEST_VAR),
            manifest_path: read(MANIFEST_PATH_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH)),
            backing_host_url: read(BACKING_HOST_URL_VAR)
                .unwrap_or_else(|| DEFAULT_BACKING_HOST_URL.to_string()),
            enable_concurrency_fan_out: parse_flag(
                ENABLE_FAN_OUT_VAR,
                read(ENABLE_FAN_OUT_VAR),
                true,
            )?,
            enable_deployment_gate: parse_flag(ENABLE_GATE_VAR, read(ENABLE_GATE_VAR), true)?,
            fan_out_join_timeout: parse_millis(
                FAN_OUT_JOIN_TIMEOUT_VAR,
                read(FAN_OUT_JOIN_TIMEOUT_VAR),
                DEFAULT_FAN_OUT_JOIN_TIMEOUT,
            )?,
            keep_alive_pause: parse_millis(
                KEEP_ALIVE_PAUSE_VAR,
                read(KEEP_ALIVE_PAUSE_VAR),
                DEFAULT_KEEP_ALIVE_PAUSE,
            )?,
            probe_timeout: parse_millis(
                PROBE_TIMEOUT_VAR,
                read(PROBE_TIMEOUT_VAR),
                DEFAULT_PROBE_TIMEOUT,
            )?,
            sign_public_probes: parse_flag(SIGN_PROBES_VAR, read(SIGN_PROBES_VAR), false)?,
            signing_service: read(SIGNING_SERVICE_VAR)
                .unwrap_or_else(|| DEFAULT_SIGNING_SERVICE.to_string()),
        })
    }

    pub fn require_api_base_url(&self) -> Result<&str, ConfigError> {
        self.api_base_url
            .as_deref()
            .ok_or(ConfigError::Missing(API_BASE_URL_VAR))
    }

    /// A bare version number or `$LATEST` qualifies the target function; any
    /// other value (ARN, `name:alias`, plain name) is used as the function name.
    pub fn candidate_target(&self) -> Result<CandidateTarget, ConfigError> {
        let version = self
            .version_to_test
            .as_deref()
            .map(str::trim)
            .ok_or(ConfigError::Missing(VERSION_TO_TEST_VAR))?;

        let is_bare_version =
            version == "$LATEST" || version.chars().all(|character| character.is_ascii_digit());
        if is_bare_version {
            Ok(CandidateTarget {
                function_name: self.target_function.clone(),
                qualifier: Some(version.to_string()),
            })
        } else {
            Ok(CandidateTarget {
                function_name: version.to_string(),
                qualifier: None,
            })
        }
    }
}

fn parse_flag(
    name: &'static str,
    raw: Option<String>,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw,
            expected: "a boolean",
        }),
    }
}

fn parse_millis(
    name: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
            expected: "a whole number of milliseconds",
        })
}
