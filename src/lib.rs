//! # PetalFlow: graph-driven workflow execution engine
//!
//! PetalFlow executes directed graphs of nodes against a lightweight
//! per-run data vehicle (the [`Envelope`](envelope::Envelope)), with
//! conditional routing, an optional parallel scheduler, and a replayable
//! event fabric for observing runs live or after the fact.
//!
//! ## Core Concepts
//!
//! - **Envelope**: the per-run data vehicle — variables, recorded errors,
//!   a trace record — threaded through every node invocation.
//! - **Node**: an async unit of work; some nodes additionally implement
//!   [`Router`](node::Router), [`MergeCapable`](node::MergeCapable), or
//!   streaming capability.
//! - **Graph**: an immutable, cycle-permitting record of nodes and edges.
//! - **Scheduler**: sequential or parallel execution of a graph, emitting
//!   lifecycle events as it goes.
//! - **Expression language**: the condition language conditional router
//!   nodes evaluate against envelope variables.
//! - **Event fabric**: an in-process bus plus an append-only store,
//!   replayable over Server-Sent Events.
//!
//! ## Quick Start
//!
//! ```
//! use petalflow::envelope::Envelope;
//! use petalflow::graph::GraphBuilder;
//! use petalflow::node::{Node, NodeContext, NodeFailure, NodeKind};
//! use petalflow::scheduler::{Scheduler, SchedulerOptions};
//! use petalflow::event::EventBus;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Greet;
//!
//! #[async_trait]
//! impl Node for Greet {
//!     fn id(&self) -> &str {
//!         "greet"
//!     }
//!     fn kind(&self) -> NodeKind {
//!         NodeKind::Noop
//!     }
//!     async fn run(&self, _ctx: &NodeContext, mut env: Envelope) -> Result<Envelope, NodeFailure> {
//!         env.set_var("greet_output", serde_json::json!("hello"));
//!         Ok(env)
//!     }
//! }
//!
//! # async fn run() {
//! let graph = GraphBuilder::new()
//!     .add_node(Arc::new(Greet))
//!     .with_entry("greet")
//!     .compile()
//!     .unwrap();
//!
//! let scheduler = Scheduler::new(Arc::new(EventBus::default()), None);
//! let env = scheduler
//!     .run(&graph, Envelope::new(), SchedulerOptions::default())
//!     .await
//!     .unwrap();
//! assert_eq!(env.get_var("greet_output"), Some(&serde_json::json!("hello")));
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`envelope`] - the per-run data vehicle
//! - [`node`] - the node contract and optional capabilities
//! - [`graph`] - immutable graph structure and its builder
//! - [`expr`] - the conditional-routing expression language
//! - [`router`] - the conditional router node
//! - [`event`] - the event fabric (bus, store, sequencing)
//! - [`sse`] - replay-then-live Server-Sent Events framing
//! - [`registry`] - the process-wide node type catalog
//! - [`compiler`] - the declarative agent-workflow compiler
//! - [`scheduler`] - sequential and parallel execution
//! - [`telemetry`] - tracing initialization and error pretty-printing
//! - [`error`] - the crate's unified error type

pub mod compiler;
pub mod envelope;
pub mod error;
pub mod event;
pub mod expr;
pub mod graph;
pub mod node;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod sse;
pub mod telemetry;
pub mod utils;
