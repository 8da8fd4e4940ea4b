use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use warm_gate_core::contract::DeploymentHookEvent;
use warm_gate_core::smoke::TargetMode;
use warm_gate_lambda::adapters::aws::{AwsLambdaInvoker, CodeDeployStatusReporter};
use warm_gate_lambda::adapters::probe::DirectProbeTransport;
use warm_gate_lambda::config::Settings;
use warm_gate_lambda::handlers::gate::DeploymentGate;
use warm_gate_lambda::handlers::smoke_runner::SmokeTestRunner;
use warm_gate_lambda::logging;

async fn handle_request(
    gate: &DeploymentGate,
    event: LambdaEvent<DeploymentHookEvent>,
) -> Result<Value, Error> {
    let outcome = gate.pre_traffic_hook(event.payload).await?;
    Ok(json!({ "status": outcome.run.status().map(|status| status.as_str()) }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init();
    let settings = Settings::from_env()?;

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let reporter = Arc::new(CodeDeployStatusReporter::new(
        aws_sdk_codedeploy::Client::new(&aws_config),
    ));

    // Without a candidate the hook still runs and reports Failed.
    let runner = match settings.candidate_target() {
        Ok(target) => {
            let invoker = Arc::new(AwsLambdaInvoker::new(aws_sdk_lambda::Client::new(&aws_config)));
            let transport =
                DirectProbeTransport::new(invoker, target.function_name, target.qualifier);
            SmokeTestRunner::new().with_transport(TargetMode::Direct, Arc::new(transport))
        }
        Err(error) => {
            tracing::error!(
                component = "pre_traffic_hook",
                event = "candidate_unresolved",
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
