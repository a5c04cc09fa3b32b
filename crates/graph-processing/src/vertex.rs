//! Vertices are the 'actors' of the graph.
//!
//! Each vertex owns its state exclusively behind a single lock ([`VertexActor`]) and is
//! driven by a user-supplied [`ComputeFn`]: a pure mapping from a [`ComputeContext`] to a
//! [`ComputeResult`]. All operations against one vertex are serialized through that lock;
//! the superstep engine in [`crate::graph`] fans out across *different* vertices in
//! parallel, never across the same one.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::edge::Edge;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::value::{self, Value};

/// Uniquely identifies a vertex within a graph.
///
/// Generated at creation from cryptographically random bytes (a UUIDv4, which is sourced
/// from the operating system's CSPRNG) and prefixed with the fixed namespace marker
/// `"vtx."`. Never reused within a graph's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(String);

impl VertexId {
    /// Namespace prefix every generated id carries.
    const PREFIX: &'static str = "vtx.";

    /// Mint a fresh, cryptographically random vertex id.
    pub(crate) fn generate() -> Self {
        // `Uuid::new_v4().simple()` renders as 32 lowercase hex characters, no dashes.
        VertexId(format!("{}{}", Self::PREFIX, Uuid::new_v4().simple()))
    }

    /// Wrap an already-known id string. Used by callers threading an id they received
    /// from [`crate::registry::Registry::create_vertex`] back into a later call, and by
    /// tests that need a stable, human-readable id.
    pub fn from_raw(id: impl Into<String>) -> Self {
        VertexId(id.into())
    }

    /// Borrow the id as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The role a vertex plays in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VertexType {
    /// Seeds the computation: begins active at superstep 0, the only type that may fire
    /// without incoming messages.
    Source,
    /// An ordinary vertex: becomes active only when it receives a message.
    Normal,
    /// The sink whose value [`crate::graph::Graph::get_final_value`] reports. At most one
    /// per graph (invariant 5).
    Final,
}

/// The input handed to a vertex's [`ComputeFn`].
///
/// Owned rather than borrowed from the vertex's lock, so that `ComputeFn` can be a plain
/// `Fn(ComputeContext) -> ComputeResult` with no lifetime parameter to thread through
/// every call site.
#[derive(Clone, Debug)]
pub struct ComputeContext {
    /// The vertex's value as of the start of this round (or, during outgoing-message
    /// construction, the just-computed merged value).
    pub value: Value,
    /// This round's incoming messages, unaggregated, in delivery order.
    pub raw_messages: Vec<Message>,
    /// The aggregated payload derived from `raw_messages` by the aggregation policy in
    /// [`value::aggregate`]. [`Value::Nil`] if `raw_messages` is empty.
    pub aggregated_messages: Value,
    /// This vertex's own id.
    pub vertex_id: VertexId,
    /// This vertex's superstep counter at the time compute was invoked.
    pub superstep: u64,
    /// A snapshot of this vertex's outgoing edges, in insertion order.
    pub outgoing_edges: Vec<Edge>,
}

/// The result of a vertex's compute function.
#[derive(Clone, Debug)]
pub enum ComputeResult {
    /// Deactivate. The value is left unchanged and no outgoing messages are
    /// auto-broadcast this round.
    Halt,
    /// No meaningful change happened. Outgoing messages are still built and broadcast
    /// from the current value, and the vertex deactivates afterwards.
    ///
    /// This is an explicit variant rather than something detected by comparing the
    /// returned value against the current one — equality-based detection is fragile
    /// for deeply nested payloads, and conflates "no change" with "halt".
    Unchanged,
    /// A new partial value, to be merged with the aggregated incoming payload and
    /// broadcast. The vertex remains active.
    NewValue(Value),
}

/// A pure mapping from a compute context to a compute result.
pub type ComputeFn = Arc<dyn Fn(ComputeContext) -> ComputeResult + Send + Sync>;

/// A read-only snapshot of a vertex's state, returned by `get_vertex_state` and similar
/// diagnostic calls. Cloning a live [`VertexActor`]'s state would otherwise require
/// callers to hold its lock.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexSnapshot {
    /// This vertex's id.
    pub id: VertexId,
    /// The graph this vertex belongs to.
    pub graph_id: crate::graph::GraphId,
    /// The vertex's human-readable label.
    pub name: String,
    /// The vertex's role.
    pub vertex_type: VertexType,
    /// The vertex's current value.
    pub value: Value,
    /// The vertex's superstep counter.
    pub superstep: u64,
    /// Whether the vertex is currently active.
    pub active: bool,
    /// The number of messages currently queued in `incoming_messages`.
    pub incoming_message_count: usize,
    /// The number of messages currently queued in `outgoing_messages`.
    pub outgoing_message_count: usize,
}

/// The mutable part of a vertex, guarded by a single lock (see [`VertexActor`]).
struct VertexState {
    value: Value,
    outgoing_edges: IndexMap<VertexId, Edge>,
    pending_messages: Vec<Message>,
    incoming_messages: Vec<Message>,
    outgoing_messages: Vec<Message>,
    superstep: u64,
    active: bool,
}

/// A vertex: the stateful actor at the center of this engine.
///
/// Everything but the identifying fields (`graph_id`, `id`, `name`, `vertex_type`, and the
/// compute function itself) lives behind [`VertexState`]'s lock. Concurrent callers
/// serialize naturally through that lock; the superstep engine never holds it across a
/// user-function call from more than one vertex at a time (each vertex's lock is its own).
pub struct VertexActor {
    /// The graph this vertex belongs to.
    pub graph_id: crate::graph::GraphId,
    /// This vertex's id.
    pub id: VertexId,
    /// This vertex's human-readable label.
    pub name: String,
    /// This vertex's role.
    pub vertex_type: VertexType,
    function: ComputeFn,
    state: Mutex<VertexState>,
}

impl VertexActor {
    /// Construct a new vertex actor. A `Source` vertex begins active; everything else
    /// begins dormant.
    pub fn new(
        graph_id: crate::graph::GraphId,
        id: VertexId,
        name: String,
        vertex_type: VertexType,
        function: ComputeFn,
        initial_value: Option<Value>,
    ) -> Self {
        Self {
            graph_id,
            id,
            name,
            vertex_type,
            function,
            state: Mutex::new(VertexState {
                value: initial_value.unwrap_or(Value::Nil),
                outgoing_edges: IndexMap::new(),
                pending_messages: Vec::new(),
                incoming_messages: Vec::new(),
                outgoing_messages: Vec::new(),
                superstep: 0,
                active: matches!(vertex_type, VertexType::Source),
            }),
        }
    }

    /// Add (or replace) an outgoing edge to `edge.target`. The caller (the owning
    /// [`crate::graph::Graph`]) is responsible for verifying both endpoints exist first.
    pub fn add_outgoing_edge(&self, edge: Edge) {
        let mut state = self.state.lock();
        state.outgoing_edges.insert(edge.target.clone(), edge);
    }

    /// Remove the outgoing edge to `target`, if any.
    pub fn remove_outgoing_edge(&self, target: &VertexId) -> Result<()> {
        let mut state = self.state.lock();
        state
            .outgoing_edges
            .shift_remove(target)
            .map(|_| ())
            .ok_or_else(|| Error::EdgeNotFound(target.clone()))
    }

    /// All of this vertex's outgoing edges, in insertion order.
    pub fn get_outgoing_edges(&self) -> Vec<Edge> {
        self.state.lock().outgoing_edges.values().cloned().collect()
    }

    /// The ids of every vertex this vertex has an outgoing edge toward, in insertion
    /// order.
    pub fn get_neighbors(&self) -> Vec<VertexId> {
        self.state.lock().outgoing_edges.keys().cloned().collect()
    }

    /// Explicitly enqueue a message into this vertex's outbox, bypassing compute. Adds to
    /// the outbox alongside whatever compute-generated broadcast also lands there this
    /// round, rather than replacing it.
    pub fn enqueue_outbox(&self, target: VertexId, content: Value) {
        let mut state = self.state.lock();
        let superstep = state.superstep;
        state
            .outgoing_messages
            .push(Message::new(self.id.clone(), target, content, superstep));
    }

    /// Return this vertex's outbox and clear it.
    pub fn drain_outbox(&self) -> Vec<Message> {
        std::mem::take(&mut self.state.lock().outgoing_messages)
    }

    /// Defensively ensure the outbox is empty. `drain_outbox` already clears it as part of
    /// collecting it, so this is an idempotent confirmation, not additional mutation.
    pub fn clear_outbox(&self) {
        self.state.lock().outgoing_messages.clear();
    }

    /// Append delivered messages to this vertex's pending buffer, to be exposed as
    /// `incoming_messages` at the next `advance()`.
    pub fn receive(&self, messages: Vec<Message>) {
        self.state.lock().pending_messages.extend(messages);
    }

    /// Advance this vertex to the next superstep: `incoming_messages` becomes the just-
    /// delivered `pending_messages`, which is cleared; the vertex becomes active if that
    /// batch was non-empty, otherwise `active` is left as-is.
    pub fn advance(&self) {
        let mut state = self.state.lock();
        state.superstep += 1;
        let pending = std::mem::take(&mut state.pending_messages);
        if !pending.is_empty() {
            state.active = true;
        }
        state.incoming_messages = pending;
    }

    /// Whether this vertex is currently active.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// This vertex's role.
    pub fn get_type(&self) -> VertexType {
        self.vertex_type
    }

    /// A read-only snapshot of this vertex's current state.
    pub fn get_state(&self) -> VertexSnapshot {
        let state = self.state.lock();
        VertexSnapshot {
            id: self.id.clone(),
            graph_id: self.graph_id.clone(),
            name: self.name.clone(),
            vertex_type: self.vertex_type,
            value: state.value.clone(),
            superstep: state.superstep,
            active: state.active,
            incoming_message_count: state.incoming_messages.len(),
            outgoing_message_count: state.outgoing_messages.len(),
        }
    }

    /// Run one superstep's worth of compute for this vertex, buffering any emitted
    /// messages into the outbox.
    ///
    /// Returns the number of outgoing-edge conditions that panicked while building the
    /// broadcast (each one is also logged as a delivery warning and treated as "do not
    /// send" for that edge); `0` for a vertex that is dormant, auto-halts, halts, or has
    /// no outgoing edges whose condition panicked. Returns
    /// `Err(Error::UserFunctionFailure)` if the compute function itself panicked; that
    /// panic is caught here and never unwinds past this call.
    pub fn compute(&self, round: u64) -> Result<usize> {
        let ctx = {
            let state = self.state.lock();
            if !state.active {
                // Dormant: skipped by the engine, no transition.
                return Ok(0);
            }
            if state.incoming_messages.is_empty() && state.superstep > 0 {
                // Auto-halt: handled without invoking the user function at all.
                drop(state);
                self.state.lock().active = false;
                return Ok(0);
            }

            let aggregated = value::aggregate(
                &state
                    .incoming_messages
                    .iter()
                    .map(|m| m.content.clone())
                    .collect::<Vec<_>>(),
            );
            ComputeContext {
                value: state.value.clone(),
                raw_messages: state.incoming_messages.clone(),
                aggregated_messages: aggregated,
                vertex_id: self.id.clone(),
                superstep: state.superstep,
                outgoing_edges: state.outgoing_edges.values().cloned().collect(),
            }
        };

        let raw_messages = ctx.raw_messages.clone();
        let aggregated_messages = ctx.aggregated_messages.clone();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| (self.function)(ctx)));

        let result = result.map_err(|_| {
            tracing::error!(vertex_id = %self.id, round, "compute function panicked");
            Error::UserFunctionFailure {
                vertex_id: self.id.clone(),
                round,
            }
        })?;

        match result {
            ComputeResult::Halt => {
                self.state.lock().active = false;
                // No broadcast; explicit sends queued earlier remain untouched.
                Ok(0)
            }
            ComputeResult::Unchanged => {
                let (broadcast_value, edges, superstep) = {
                    let mut state = self.state.lock();
                    state.active = false;
                    (
                        state.value.clone(),
                        state.outgoing_edges.values().cloned().collect::<Vec<_>>(),
                        state.superstep,
                    )
                };
                Ok(self.broadcast(broadcast_value, raw_messages, aggregated_messages, edges, superstep))
            }
            ComputeResult::NewValue(new_value) => {
                let merged = Value::merge(new_value, aggregated_messages.clone());
                let (edges, superstep) = {
                    let mut state = self.state.lock();
                    state.value = merged.clone();
                    (
                        state.outgoing_edges.values().cloned().collect::<Vec<_>>(),
                        state.superstep,
                    )
                };
                Ok(self.broadcast(merged, raw_messages, aggregated_messages, edges, superstep))
            }
        }
    }

    /// Evaluate each outgoing edge's condition against a context carrying the
    /// just-computed value (every other field — `raw_messages`, `aggregated_messages`,
    /// `superstep`, `outgoing_edges` — is the same context the compute function itself
    /// saw), and enqueue a message for every edge that should send. Returns the number
    /// of conditions that panicked; each is logged and treated as "do not send".
    fn broadcast(
        &self,
        value: Value,
        raw_messages: Vec<Message>,
        aggregated_messages: Value,
        edges: Vec<Edge>,
        superstep: u64,
    ) -> usize {
        let condition_ctx = ComputeContext {
            value: value.clone(),
            raw_messages,
            aggregated_messages,
            vertex_id: self.id.clone(),
            superstep,
            outgoing_edges: edges.clone(),
        };

        let mut outbound = Vec::new();
        let mut condition_panics = 0usize;
        for edge in &edges {
            match edge.try_should_send(&condition_ctx) {
                Ok(true) => outbound.push(Message::new(
                    self.id.clone(),
                    edge.target.clone(),
                    value.clone(),
                    superstep,
                )),
                Ok(false) => {}
                Err(()) => {
                    condition_panics += 1;
                    tracing::warn!(
                        vertex_id = %self.id,
                        target = %edge.target,
                        "edge condition panicked; treating as delivery warning"
                    );
                }
            }
        }

        if !outbound.is_empty() {
            self.state.lock().outgoing_messages.extend(outbound);
        }

        condition_panics
    }
}
