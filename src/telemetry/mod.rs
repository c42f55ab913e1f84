//! Logging/tracing initialization and pretty-printing for recorded errors
//! (SPEC_FULL.md ambient-stack EXPANSION item 1).

use crate::envelope::NodeError;
use crate::event::Event;
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta / dark pink
pub const RESET_COLOR: &str = "\x1b[0m";

/// Initializes the global `tracing` subscriber: `RUST_LOG`-driven filter,
/// a plain `fmt` layer, and `tracing-error`'s span-trace capture so
/// [`miette`] diagnostics can render the active span stack. Call once at
/// process start; a second call is a no-op (errors from `try_init` are
/// swallowed).
pub fn init_tracing() {
    let fmt_layer = fmt::layer().with_target(false).with_file(false).with_line_number(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,petalflow=info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init();

    miette::set_panic_hook();
}

/// Rendered output for a telemetry item that can be consumed by sinks.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    #[must_use]
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> EventRender;
    fn render_errors(&self, errors: &[NodeError]) -> Vec<EventRender>;
}

pub struct PlainFormatter;

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        let line = format!(
            "{LINE_COLOR}[{seq}] {kind} node={node} run={run}{RESET_COLOR}\n",
            seq = event.seq,
            kind = event.kind,
            node = event.node_id.as_deref().unwrap_or("-"),
            run = event.run_id,
        );
        EventRender {
            context: event.node_id.clone(),
            lines: vec![line],
        }
    }

    fn render_errors(&self, errors: &[NodeError]) -> Vec<EventRender> {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let mut lines = Vec::new();
                let scope_str = format!("{CONTEXT_COLOR}{}{RESET_COLOR}", e.node_id);
                lines.push(format!("[{i}] {} | {}\n", e.at, scope_str));
                lines.push(format!("{LINE_COLOR}  error: {}{RESET_COLOR}\n", e.message));
                if let Some(cause) = &e.cause {
                    lines.push(format!("{LINE_COLOR}  cause: {cause}{RESET_COLOR}\n"));
                }
                EventRender {
                    context: Some(e.node_id.clone()),
                    lines,
                }
            })
            .collect()
    }
}
