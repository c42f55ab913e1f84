//! The execution scheduler (spec §4.2): sequential and parallel executors
//! sharing one run-lifecycle facade.

mod parallel;
mod sequential;
mod step;
mod successor;

pub use step::{EnvelopeMutation, StepAction, StepConfig, StepController, StepPoint, StepSnapshot};
pub use successor::{select_successors, SuccessorSelection, GATE_REDIRECT_KEY};

use crate::envelope::Envelope;
use crate::error::PetalFlowError;
use crate::event::{Event, EventBuilder, EventBus, EventKind, EventStore};
use crate::graph::Graph;
use crate::utils::ids::generate_run_id;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation flag, checked by the scheduler between node
/// dispatches and passed (conceptually) into node invocations (spec §5
/// "Cancellation and timeouts").
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Scheduler run options (spec §4.2 "Options").
pub struct SchedulerOptions {
    pub max_hops: u32,
    pub continue_on_error: bool,
    /// 1 selects the sequential executor, ≥ 2 the parallel executor.
    pub concurrency: usize,
    pub step_controller: Option<Arc<dyn StepController>>,
    pub step_config: StepConfig,
    pub cancellation: CancellationToken,
    /// Injectable clock (spec.md "now: function → timestamp"), defaulting
    /// to the real wall clock. Lets callers (tests, replay tooling) pin
    /// event timestamps instead of sleeping to observe ordering.
    pub now: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    /// Callback sink invoked with every emitted event, after the event bus
    /// and before the bounded internal channel (spec §4.5 "Event sinks").
    pub event_handler: Option<Arc<dyn Fn(&Event) + Send + Sync>>,
    /// Wraps the in-flight [`EventBuilder`] before sealing, so an
    /// observability adapter can enrich events with active trace/span ids
    /// (spec.md "eventEmitterDecorator") via [`EventBuilder::trace`].
    pub event_emitter_decorator: Option<Arc<dyn Fn(EventBuilder) -> EventBuilder + Send + Sync>>,
    /// Bounded internal channel sink; a full channel drops the event
    /// rather than blocking the run (spec §4.5 "Event sinks").
    pub event_channel: Option<flume::Sender<Event>>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_hops: 100,
            continue_on_error: false,
            concurrency: 1,
            step_controller: None,
            step_config: StepConfig::default(),
            cancellation: CancellationToken::new(),
            now: Arc::new(Utc::now),
            event_handler: None,
            event_emitter_decorator: None,
            event_channel: None,
        }
    }
}

/// Publishes to every configured sink, in the order spec §4.5 "Event
/// sinks" requires: the event bus, the optional event handler callback,
/// then the bounded internal channel (dropped if full); the store append
/// (an addition beyond the spec's sink list, for SSE replay) happens last.
/// The optional emitter decorator wraps the builder before sealing so it
/// can stamp trace/span ids ahead of every sink seeing the event.
pub(crate) async fn emit(
    bus: &EventBus,
    store: Option<&dyn EventStore>,
    run_id: &str,
    builder: EventBuilder,
    options: &SchedulerOptions,
) -> Event {
    let builder = match &options.event_emitter_decorator {
        Some(decorator) => decorator(builder),
        None => builder,
    };
    let event = bus.publish_at(run_id, builder, (options.now)());

    if let Some(handler) = &options.event_handler {
        handler(&event);
    }
    if let Some(sender) = &options.event_channel {
        let _ = sender.try_send(event.clone());
    }
    if let Some(store) = store {
        store.append(event.clone()).await;
    }
    event
}

/// The scheduler facade (spec §4.2): given `(graph, initialEnv, options)`
/// produces `(finalEnv, error)` and emits events via the configured sinks.
pub struct Scheduler {
    bus: Arc<EventBus>,
    store: Option<Arc<dyn EventStore>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(bus: Arc<EventBus>, store: Option<Arc<dyn EventStore>>) -> Self {
        Self { bus, store }
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Runs `graph` to completion against `env`, per the run lifecycle in
    /// spec §4.2: validate, assign a run id, emit `run.started`, execute,
    /// emit `run.finished`.
    pub async fn run(
        &self,
        graph: &Graph,
        mut env: Envelope,
        options: SchedulerOptions,
    ) -> Result<Envelope, PetalFlowError> {
        env.ensure_trace(generate_run_id());
        let run_id = env.run_id().expect("ensure_trace set it above").to_string();

        emit(
            &self.bus,
            self.store.as_deref(),
            &run_id,
            Event::builder(EventKind::RunStarted, &run_id)
                .payload(json!({ "graph": graph.name(), "entry": graph.entry() })),
            &options,
        )
        .await;

        let result = if options.concurrency <= 1 {
            sequential::run(graph, env, &options, &self.bus, self.store.as_deref(), &run_id).await
        } else {
            parallel::run(graph, env, &options, &self.bus, self.store.as_deref(), &run_id).await
        };

        let finished_payload = match &result {
            Ok(_) => json!({ "status": "completed" }),
            Err(e) => json!({ "status": "failed", "error": e.to_string() }),
        };
        emit(
            &self.bus,
            self.store.as_deref(),
            &run_id,
            Event::builder(EventKind::RunFinished, &run_id).payload(finished_payload),
            &options,
        )
        .await;

        result
    }
}
