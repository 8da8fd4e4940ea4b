use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_codedeploy::types::LifecycleEventStatus;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sigv4::http_request::{
    sign, SignableBody, SignableRequest, SigningParams, SigningSettings,
};
use aws_sigv4::sign::v4;
use reqwest::{Method, Url};
use warm_gate_core::contract::{DeploymentHookEvent, Headers, LifecycleStatus};

use crate::adapters::invoke::{FunctionInvoker, InvokeRequest};
use crate::adapters::probe::RequestSigner;
use crate::adapters::status::StatusReporter;
use crate::error::{InvokeError, ProbeError, ReportError};

#[derive(Clone)]
pub struct AwsLambdaInvoker {
    lambda_client: aws_sdk_lambda::Client,
}

impl AwsLambdaInvoker {
    pub fn new(lambda_client: aws_sdk_lambda::Client) -> Self {
        Self { lambda_client }
    }
}

#[async_trait]
impl FunctionInvoker for AwsLambdaInvoker {
    async fn invoke(&self, request: InvokeRequest) -> Result<Vec<u8>, InvokeError> {
        let InvokeRequest {
            function_name,
            qualifier,
            payload,
        } = request;

        let output = self
            .lambda_client
            .invoke()
            .function_name(function_name.clone())
            .set_qualifier(qualifier)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|error| InvokeError::Sdk {
                function_name: function_name.clone(),
                message: error.to_string(),
            })?;

        let body = output
            .payload()
            .map(|blob| blob.as_ref().to_vec())
            .unwrap_or_default();

        if let Some(kind) = output.function_error() {
            return Err(InvokeError::FunctionError {
                function_name,
                kind: kind.to_string(),
                payload: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(body)
    }
}

#[derive(Clone)]
pub struct CodeDeployStatusReporter {
    codedeploy_client: aws_sdk_codedeploy::Client,
}

impl CodeDeployStatusReporter {
    pub fn new(codedeploy_client: aws_sdk_codedeploy::Client) -> Self {
        Self { codedeploy_client }
    }
}

#[async_trait]
impl StatusReporter for CodeDeployStatusReporter {
    async fn report(
        &self,
        event: &DeploymentHookEvent,
        status: LifecycleStatus,
    ) -> Result<(), ReportError> {
        let lifecycle_status = match status {
            LifecycleStatus::Succeeded => LifecycleEventStatus::Succeeded,
            LifecycleStatus::Failed => LifecycleEventStatus::Failed,
        };

        self.codedeploy_client
            .put_lifecycle_event_hook_execution_status()
            .deployment_id(event.deployment_id.clone())
            .lifecycle_event_hook_execution_id(event.hook_execution_id.clone())
            .status(lifecycle_status)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| ReportError {
                deployment_id: event.deployment_id.clone(),
                hook_execution_id: event.hook_execution_id.clone(),
                status: status.to_string(),
                message: error.to_string(),
            })
    }
}

/// SigV4 signer for probes against IAM-protected endpoints. Credentials are
/// resolved per request so rotated session credentials are picked up.
#[derive(Debug, Clone)]
pub struct SigV4RequestSigner {
    credentials: SharedCredentialsProvider,
    region: String,
    service: String,
}

impl SigV4RequestSigner {
    pub fn new(
        credentials: SharedCredentialsProvider,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    pub fn from_sdk_config(config: &SdkConfig, service: &str) -> Result<Self, ProbeError> {
        let credentials = config
            .credentials_provider()
            .ok_or_else(|| ProbeError::Signing("no credentials provider configured".to_string()))?;
        let region = config
            .region()
            .ok_or_else(|| ProbeError::Signing("no region configured".to_string()))?;
        Ok(Self::new(credentials, region.to_string(), service))
    }
}

#[async_trait]
impl RequestSigner for SigV4RequestSigner {
    async fn sign(
        &self,
        method: &Method,
        url: &Url,
        headers: &Headers,
        body: &[u8],
    ) -> Result<Headers, ProbeError> {
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|error| ProbeError::Signing(error.to_string()))?;
        let identity = credentials.into();
        let params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(&self.service)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|error| ProbeError::Signing(error.to_string()))?
            .into();

        let signable = SignableRequest::new(
            method.as_str(),
            url.as_str(),
            headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
            SignableBody::Bytes(body),
        )
        .map_err(|error| ProbeError::Signing(error.to_string()))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|error| ProbeError::Signing(error.to_string()))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}
