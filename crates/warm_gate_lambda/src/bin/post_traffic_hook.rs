use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use warm_gate_core::contract::DeploymentHookEvent;
use warm_gate_core::smoke::TargetMode;
use warm_gate_lambda::adapters::aws::{CodeDeployStatusReporter, SigV4RequestSigner};
use warm_gate_lambda::adapters::probe::HttpProbeTransport;
use warm_gate_lambda::config::Settings;
use warm_gate_lambda::handlers::gate::DeploymentGate;
use warm_gate_lambda::handlers::smoke_runner::SmokeTestRunner;
use warm_gate_lambda::logging;

async fn handle_request(
    gate: &DeploymentGate,
    event: LambdaEvent<DeploymentHookEvent>,
) -> Result<Value, Error> {
    let outcome = gate.post_traffic_hook(event.payload).await?;
    Ok(json!({ "status": outcome.run.status().map(|status| status.as_str()) }))
}

fn public_endpoint_transport(
    settings: &Settings,
    aws_config: &aws_config::SdkConfig,
) -> Result<HttpProbeTransport, String> {
    let base_url = settings
        .require_api_base_url()
        .map_err(|error| error.to_string())?;
    let transport = HttpProbeTransport::new(base_url, settings.probe_timeout)
        .map_err(|error| error.to_string())?;
    if !settings.sign_public_probes {
        return Ok(transport);
    }
    let signer = SigV4RequestSigner::from_sdk_config(aws_config, &settings.signing_service)
        .map_err(|error| error.to_string())?;
    Ok(transport.with_signer(Arc::new(signer)))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init();
    let settings = Settings::from_env()?;

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let reporter = Arc::new(CodeDeployStatusReporter::new(
        aws_sdk_codedeploy::Client::new(&aws_config),
    ));

    let transport = public_endpoint_transport(&settings, &aws_config);
    let runner = match transport {
        Ok(transport) => {
            SmokeTestRunner::new().with_transport(TargetMode::PublicEndpoint, Arc::new(transport))
        }
        Err(error) => {
            tracing::error!(
                component = "post_traffic_hook",
                event = "endpoint_unresolved",
                error = %error,
            );
            SmokeTestRunner::new()
        }
    };

    let gate = DeploymentGate::new(runner, reporter, settings.manifest_path.clone())
        .enabled(settings.enable_deployment_gate)
        .function_version(settings.function_version.clone());

    let gate = &gate;
    lambda_runtime::run(service_fn(move |event| handle_request(gate, event))).await
}
