use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lambda_runtime::{service_fn, Error, LambdaEvent};
use warm_gate_core::budget::remaining_until;
use warm_gate_core::contract::{InvocationEvent, ProxyResponse};
use warm_gate_core::state::WorkerState;
use warm_gate_lambda::adapters::aws::AwsLambdaInvoker;
use warm_gate_lambda::adapters::forwarding_host::ForwardingHost;
use warm_gate_lambda::config::Settings;
use warm_gate_lambda::handlers::dispatcher::{Dispatcher, DispatcherConfig};
use warm_gate_lambda::handlers::prewarm::Prewarmer;
use warm_gate_lambda::logging;

/// Upper bound for a single upstream call; the soft deadline normally fires
/// well before this.
const UPSTREAM_REQUEST_TIMEOUT: Duration = Duration::from_secs(900);

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

async fn handle_request(
    dispatcher: &Dispatcher,
    event: LambdaEvent<InvocationEvent>,
) -> Result<ProxyResponse, Error> {
    let remaining = remaining_until(event.context.deadline, now_epoch_ms());
    let response = dispatcher.handle(event.payload, remaining).await?;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init();
    let settings = Settings::from_env()?;

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let invoker = Arc::new(AwsLambdaInvoker::new(aws_sdk_lambda::Client::new(&aws_config)));
    let prewarmer = Prewarmer::new(
        invoker,
        settings.target_function.clone(),
        settings.fan_out_join_timeout,
    );
    let host = Arc::new(ForwardingHost::new(
        &settings.backing_host_url,
        UPSTREAM_REQUEST_TIMEOUT,
    )?);

    let dispatcher = Dispatcher::new(
        DispatcherConfig::from(&settings),
        Arc::new(WorkerState::new()),
        host,
    )
    .with_prewarmer(prewarmer)
    .on_correlation_id(|correlation_id| {
        tracing::debug!(component = "entry_lambda", event = "correlation_id", correlation_id);
    });

    tracing::info!(
        component = "entry_lambda",
        event = "initialized",
        target_function = %settings.target_function,
        backing_host_url = %settings.backing_host_url,
        fan_out = settings.enable_concurrency_fan_out,
    );

    let dispatcher = &dispatcher;
    lambda_runtime::run(service_fn(move |event| handle_request(dispatcher, event))).await
}
