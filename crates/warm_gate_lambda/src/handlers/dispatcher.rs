//! Single entry point for every invocation of the function.
//!
//! Control invocations (no HTTP method) warm the environment and optionally
//! fan out to sibling environments; application invocations get a correlation
//! id and a soft deadline and are handed to the backing host untouched.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use warm_gate_core::budget::soft_deadline;
use warm_gate_core::classify::{classify, ConcurrencyRequest, ControlSignals, InvocationKind};
use warm_gate_core::contract::{InvocationEvent, ProxyResponse, CORRELATION_HEADER};
use warm_gate_core::state::WorkerState;

use crate::adapters::host::BackingHost;
use crate::config::{Settings, DEFAULT_KEEP_ALIVE_PAUSE};
use crate::error::HostError;
use crate::handlers::prewarm::Prewarmer;

/// Called with the resolved correlation id before the backing host runs.
pub type CorrelationHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub enable_concurrency_fan_out: bool,
    /// Best-effort pause on keep-alive invocations. It narrows, but does not
    /// close, the window in which the platform hands two pings to one
    /// environment.
    pub keep_alive_pause: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enable_concurrency_fan_out: true,
            keep_alive_pause: DEFAULT_KEEP_ALIVE_PAUSE,
        }
    }
}

impl From<&Settings> for DispatcherConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            enable_concurrency_fan_out: settings.enable_concurrency_fan_out,
            keep_alive_pause: settings.keep_alive_pause,
        }
    }
}

pub struct Dispatcher {
    config: DispatcherConfig,
    state: Arc<WorkerState>,
    host: Arc<dyn BackingHost>,
    prewarmer: Option<Prewarmer>,
    correlation_hook: Option<CorrelationHook>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        state: Arc<WorkerState>,
        host: Arc<dyn BackingHost>,
    ) -> Self {
        Self {
            config,
            state,
            host,
            prewarmer: None,
            correlation_hook: None,
        }
    }

    pub fn with_prewarmer(mut self, prewarmer: Prewarmer) -> Self {
        self.prewarmer = Some(prewarmer);
        self
    }

    pub fn on_correlation_id(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.correlation_hook = Some(Arc::new(hook));
        self
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    pub async fn handle(
        &self,
        event: InvocationEvent,
        remaining_budget: Duration,
    ) -> Result<ProxyResponse, HostError> {
        match classify(&event) {
            InvocationKind::Control(signals) => {
                self.handle_control(event, signals, remaining_budget).await
            }
            InvocationKind::Application => self.handle_application(event, remaining_budget).await,
        }
    }

    async fn handle_control(
        &self,
        event: InvocationEvent,
        signals: ControlSignals,
        remaining_budget: Duration,
    ) -> Result<ProxyResponse, HostError> {
        let started = tokio::time::Instant::now();
        match &signals.concurrency {
            Some(ConcurrencyRequest::Count(_)) => self.fan_out(&signals, remaining_budget).await,
            Some(ConcurrencyRequest::Unparseable(raw)) => {
                tracing::warn!(
                    component = "dispatcher",
                    event = "invalid_concurrency_header",
                    value = %raw,
                );
            }
            None => {}
        }

        if signals.keep_alive {
            tokio::time::sleep(self.config.keep_alive_pause).await;
        }

        let warm = self.state.is_warm();
        if signals.is_bare_ping() && !warm {
            tracing::info!(
                component = "dispatcher",
                event = "cold_start_affected_caller",
            );
        }

        tracing::info!(
            component = "dispatcher",
            event = "control_invocation",
            warm,
            payload = %serde_json::to_string(&event).unwrap_or_default(),
        );

        if warm {
            return Ok(ProxyResponse::empty_success());
        }

        tracing::info!(component = "dispatcher", event = "keep_alive_ping_forwarded");
        let remaining_budget = remaining_budget.saturating_sub(started.elapsed());
        let response = self.forward(event.into_ping(), remaining_budget).await;
        self.state.mark_warm();
        response
    }

    async fn fan_out(&self, signals: &ControlSignals, remaining_budget: Duration) {
        let count = signals.additional_environments();
        if !self.config.enable_concurrency_fan_out {
            tracing::info!(
                component = "dispatcher",
                event = "fan_out_disabled",
                requested = count,
            );
            return;
        }
        let Some(prewarmer) = &self.prewarmer else {
            tracing::warn!(
                component = "dispatcher",
                event = "fan_out_unavailable",
                requested = count,
            );
            return;
        };
        prewarmer.prewarm(count, remaining_budget).await;
    }

    async fn handle_application(
        &self,
        mut event: InvocationEvent,
        remaining_budget: Duration,
    ) -> Result<ProxyResponse, HostError> {
        let guard = self.state.enter_application();
        if guard.overlapped() {
            tracing::warn!(
                component = "dispatcher",
                event = "concurrent_application_invocation",
                in_flight = self.state.in_flight(),
            );
        }

        // An empty inbound header resolves to a fresh id; the host sees that one.
        let correlation_id = self.state.correlation().resolve(&event);
        event
            .headers
            .insert(CORRELATION_HEADER.to_string(), correlation_id.clone());
        if let Some(hook) = &self.correlation_hook {
            hook(&correlation_id);
        }

        let span = tracing::info_span!("invocation", correlation_id = %correlation_id);
        let response = self
            .forward(event, remaining_budget)
            .instrument(span)
            .await;

        self.state.mark_warm();
        drop(guard);
        response
    }

    async fn forward(
        &self,
        event: InvocationEvent,
        remaining_budget: Duration,
    ) -> Result<ProxyResponse, HostError> {
        let cancel = CancellationToken::new();
        let _deadline = SoftDeadline::arm(cancel.clone(), remaining_budget);
        self.host.handle(event, cancel).await
    }
}

/// Cancels the token once 75% of the remaining budget has elapsed. The timer
/// is dropped together with the invocation that armed it.
struct SoftDeadline {
    timer: JoinHandle<()>,
}

impl SoftDeadline {
    fn arm(cancel: CancellationToken, remaining_budget: Duration) -> Self {
        let delay = soft_deadline(remaining_budget);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::warn!(
                component = "dispatcher",
                event = "soft_deadline_elapsed",
                soft_deadline_ms = delay.as_millis() as u64,
            );
            cancel.cancel();
        });
        Self { timer }
    }
}

impl Drop for SoftDeadline {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use warm_gate_core::contract::{Headers, CONCURRENCY_HEADER, KEEP_ALIVE_HEADER};

    use super::*;
    use crate::adapters::invoke::{FunctionInvoker, InvokeRequest};
    use crate::error::InvokeError;

    const BUDGET: Duration = Duration::from_secs(30);

    struct RecordingHost {
        events: Mutex<Vec<InvocationEvent>>,
        delay: Duration,
        fail: bool,
    }

    impl RecordingHost {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn events(&self) -> Vec<InvocationEvent> {
            self.events.lock().expect("poisoned mutex").clone()
        }
    }

    #[async_trait]
    impl BackingHost for RecordingHost {
        async fn handle(
            &self,
            event: InvocationEvent,
            _cancel: CancellationToken,
        ) -> Result<ProxyResponse, HostError> {
            self.events.lock().expect("poisoned mutex").push(event);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(HostError::InvalidRequest("boom".to_string()));
            }
            Ok(ProxyResponse::json(200, &json!({"ok": true})))
        }
    }

    /// Waits for cancellation and records how long it took.
    #[derive(Default)]
    struct DeadlineProbeHost {
        cancelled_after: Mutex<Option<Duration>>,
    }

    #[async_trait]
    impl BackingHost for DeadlineProbeHost {
        async fn handle(
            &self,
            _event: InvocationEvent,
            cancel: CancellationToken,
        ) -> Result<ProxyResponse, HostError> {
            let started = tokio::time::Instant::now();
            tokio::time::sleep(Duration::from_millis(749)).await;
            assert!(!cancel.is_cancelled(), "cancelled before the soft deadline");
            cancel.cancelled().await;
            *self.cancelled_after.lock().expect("poisoned mutex") = Some(started.elapsed());
            Ok(ProxyResponse::json(504, &json!({"error": "deadline_exceeded"})))
        }
    }

    #[derive(Default)]
    struct CountingInvoker {
        calls: AtomicUsize,
        payloads: Mutex<Vec<Vec<u8>>>,
        delay: Duration,
    }

    #[async_trait]
    impl FunctionInvoker for CountingInvoker {
        async fn invoke(&self, request: InvokeRequest) -> Result<Vec<u8>, InvokeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.payloads
                .lock()
                .expect("poisoned mutex")
                .push(request.payload);
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }
    }

    fn dispatcher(host: Arc<dyn BackingHost>) -> Dispatcher {
        Dispatcher::new(
            DispatcherConfig::default(),
            Arc::new(WorkerState::new()),
            host,
        )
    }

    fn fan_out_dispatcher(
        host: Arc<dyn BackingHost>,
        invoker: Arc<CountingInvoker>,
        config: DispatcherConfig,
    ) -> Dispatcher {
        Dispatcher::new(config, Arc::new(WorkerState::new()), host).with_prewarmer(
            Prewarmer::new(invoker, "orders-api", Duration::from_secs(5)),
        )
    }

    fn control_event(headers: &[(&str, &str)]) -> InvocationEvent {
        InvocationEvent {
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect::<Headers>(),
            ..InvocationEvent::default()
        }
    }

    fn application_event(headers: &[(&str, &str)]) -> InvocationEvent {
        InvocationEvent {
            http_method: Some("POST".to_string()),
            path: Some("/orders".to_string()),
            body: Some("{\"sku\":\"A-1\"}".to_string()),
            ..control_event(headers)
        }
    }

    #[tokio::test]
    async fn cold_control_invocation_forwards_synthetic_ping() {
        let host = Arc::new(RecordingHost::new());
        let dispatcher = dispatcher(host.clone());

        let response = dispatcher
            .handle(control_event(&[]), BUDGET)
            .await
            .expect("ping should succeed");

        assert_eq!(response.body, "{\"ok\":true}");
        let events = host.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].method(), Some("GET"));
        assert_eq!(events[0].path.as_deref(), Some("/ping"));
        assert_eq!(
            events[0].headers,
            Headers::from([("Host".to_string(), "localhost".to_string())])
        );
        assert!(dispatcher.state().is_warm());
    }

    #[tokio::test]
    async fn warm_control_invocation_never_reaches_host() {
        let host = Arc::new(RecordingHost::new());
        let dispatcher = dispatcher(host.clone());
        dispatcher.state().mark_warm();

        let response = dispatcher
            .handle(control_event(&[]), BUDGET)
            .await
            .expect("ping should succeed");

        assert_eq!(response, ProxyResponse::empty_success());
        assert!(host.events().is_empty());
    }

    #[tokio::test]
    async fn concurrency_header_fans_out_n_minus_one_keep_alives() {
        for n in 0..=5u32 {
            let invoker = Arc::new(CountingInvoker::default());
            let dispatcher = fan_out_dispatcher(
                Arc::new(RecordingHost::new()),
                invoker.clone(),
                DispatcherConfig {
                    keep_alive_pause: Duration::ZERO,
                    ..DispatcherConfig::default()
                },
            );

            let count = n.to_string();
            dispatcher
                .handle(control_event(&[(CONCURRENCY_HEADER, count.as_str())]), BUDGET)
                .await
                .expect("fan-out should succeed");

            assert_eq!(
                invoker.calls.load(Ordering::SeqCst),
                n.saturating_sub(1) as usize,
                "concurrency {n}"
            );
            for payload in invoker.payloads.lock().expect("poisoned mutex").iter() {
                let event: InvocationEvent =
                    serde_json::from_slice(payload).expect("keep-alive payload");
                assert!(event.has_header(KEEP_ALIVE_HEADER));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fan_out_stays_within_invocation_budget() {
        let invoker = Arc::new(CountingInvoker {
            delay: Duration::from_secs(5),
            ..CountingInvoker::default()
        });
        let host = Arc::new(RecordingHost::new());
        let dispatcher =
            fan_out_dispatcher(host.clone(), invoker.clone(), DispatcherConfig::default());
        let started = tokio::time::Instant::now();

        dispatcher
            .handle(
                control_event(&[(CONCURRENCY_HEADER, "3")]),
                Duration::from_millis(1_000),
            )
            .await
            .expect("control invocation should succeed");

        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);
        assert_eq!(host.events()[0].path.as_deref(), Some("/ping"));
    }

    #[tokio::test]
    async fn fan_out_toggle_disables_self_invocation() {
        let invoker = Arc::new(CountingInvoker::default());
        let host = Arc::new(RecordingHost::new());
        let dispatcher = fan_out_dispatcher(
            host.clone(),
            invoker.clone(),
            DispatcherConfig {
                enable_concurrency_fan_out: false,
                ..DispatcherConfig::default()
            },
        );

        dispatcher
            .handle(control_event(&[(CONCURRENCY_HEADER, "4")]), BUDGET)
            .await
            .expect("control invocation should succeed");

        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
        assert_eq!(host.events().len(), 1);
    }

    #[tokio::test]
    async fn malformed_concurrency_still_answers_as_ping() {
        let invoker = Arc::new(CountingInvoker::default());
        let host = Arc::new(RecordingHost::new());
        let dispatcher =
            fan_out_dispatcher(host.clone(), invoker.clone(), DispatcherConfig::default());

        dispatcher
            .handle(control_event(&[(CONCURRENCY_HEADER, "lots")]), BUDGET)
            .await
            .expect("control invocation should succeed");

        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
        assert_eq!(host.events()[0].path.as_deref(), Some("/ping"));
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_invocation_pauses_before_answering() {
        let dispatcher = dispatcher(Arc::new(RecordingHost::new()));
        dispatcher.state().mark_warm();
        let started = tokio::time::Instant::now();

        dispatcher
            .handle(control_event(&[(KEEP_ALIVE_HEADER, "1")]), BUDGET)
            .await
            .expect("keep-alive should succeed");

        assert!(started.elapsed() >= Duration::from_millis(75));
    }

    #[tokio::test]
    async fn application_traffic_keeps_inbound_correlation_id() {
        let host = Arc::new(RecordingHost::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let dispatcher = dispatcher(host.clone()).on_correlation_id(move |id| {
            recorder
                .lock()
                .expect("poisoned mutex")
                .push(id.to_string());
        });

        dispatcher
            .handle(application_event(&[(CORRELATION_HEADER, "abc")]), BUDGET)
            .await
            .expect("request should succeed");

        assert_eq!(
            dispatcher.state().correlation().current().as_deref(),
            Some("abc")
        );
        assert_eq!(*seen.lock().expect("poisoned mutex"), vec!["abc".to_string()]);
        assert_eq!(host.events()[0].header(CORRELATION_HEADER), Some("abc"));
    }

    #[tokio::test]
    async fn empty_inbound_correlation_id_is_replaced_before_forwarding() {
        let host = Arc::new(RecordingHost::new());
        let dispatcher = dispatcher(host.clone());

        dispatcher
            .handle(application_event(&[(CORRELATION_HEADER, "")]), BUDGET)
            .await
            .expect("request should succeed");

        let current = dispatcher
            .state()
            .correlation()
            .current()
            .expect("correlation id resolved");
        assert!(!current.is_empty());
        assert_eq!(
            host.events()[0].header(CORRELATION_HEADER),
            Some(current.as_str())
        );
    }

    #[tokio::test]
    async fn application_traffic_is_forwarded_unmodified_and_warms() {
        let host = Arc::new(RecordingHost::new());
        let dispatcher = dispatcher(host.clone());
        let mut inbound = application_event(&[("Accept", "application/json")]);
        inbound
            .extra
            .insert("resource".to_string(), json!("/orders"));

        let response = dispatcher
            .handle(inbound.clone(), BUDGET)
            .await
            .expect("request should succeed");

        assert_eq!(response.status_code, 200);
        let forwarded = host.events().remove(0);
        let generated = forwarded
            .header(CORRELATION_HEADER)
            .expect("correlation id stamped")
            .to_string();
        assert_eq!(
            dispatcher.state().correlation().current(),
            Some(generated.clone())
        );

        let mut expected = inbound;
        expected
            .headers
            .insert(CORRELATION_HEADER.to_string(), generated);
        assert_eq!(forwarded, expected);
        assert!(dispatcher.state().is_warm());
    }

    #[tokio::test]
    async fn consecutive_requests_get_fresh_correlation_ids() {
        let host = Arc::new(RecordingHost::new());
        let dispatcher = dispatcher(host.clone());

        dispatcher
            .handle(application_event(&[]), BUDGET)
            .await
            .expect("first request");
        let first = dispatcher.state().correlation().current();
        dispatcher
            .handle(application_event(&[]), BUDGET)
            .await
            .expect("second request");
        let second = dispatcher.state().correlation().current();

        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn host_errors_propagate_and_still_warm() {
        let host = Arc::new(RecordingHost {
            fail: true,
            ..RecordingHost::new()
        });
        let dispatcher = dispatcher(host);

        let error = dispatcher
            .handle(application_event(&[]), BUDGET)
            .await
            .expect_err("host failure should surface");

        assert!(error.to_string().contains("boom"));
        assert!(dispatcher.state().is_warm());
    }

    #[tokio::test(start_paused = true)]
    async fn soft_deadline_fires_at_three_quarters_of_budget() {
        let host = Arc::new(DeadlineProbeHost::default());
        let dispatcher = dispatcher(host.clone());

        let response = dispatcher
            .handle(application_event(&[]), Duration::from_millis(1_000))
            .await
            .expect("host answers after cancellation");

        assert_eq!(response.status_code, 504);
        let cancelled_after = host
            .cancelled_after
            .lock()
            .expect("poisoned mutex")
            .expect("host observed cancellation");
        assert!(cancelled_after >= Duration::from_millis(750));
        assert!(cancelled_after < Duration::from_millis(760));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_application_invocations_share_one_correlation_slot() {
        let host = Arc::new(RecordingHost {
            delay: Duration::from_millis(50),
            ..RecordingHost::new()
        });
        let dispatcher = dispatcher(host.clone());

        let (first, second) = tokio::join!(
            dispatcher.handle(application_event(&[(CORRELATION_HEADER, "first")]), BUDGET),
            dispatcher.handle(application_event(&[(CORRELATION_HEADER, "second")]), BUDGET),
        );
        first.expect("first request");
        second.expect("second request");

        // Only one application invocation per process is supported: the later
        // one overwrites the id that log enrichment of the earlier one reads.
        assert_eq!(
            dispatcher.state().correlation().current().as_deref(),
            Some("second")
        );
        assert_eq!(dispatcher.state().in_flight(), 0);
        assert_eq!(host.events().len(), 2);
    }
}
