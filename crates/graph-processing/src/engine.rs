//! The superstep engine: the BSP driver that takes a [`crate::graph::Graph`] through a
//! sequence of five strictly ordered phases per round, plus the bounded `run` loop built
//! on top of it.

use std::time::{Duration, Instant};

use ahash::AHashMap;
#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::{Error, Result};
use crate::graph::{Graph, GraphState};
use crate::message::Message;
use crate::vertex::VertexId;

/// What happened at the end of one superstep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuperstepOutcome {
    /// No vertex is active; the graph has terminated.
    Halted,
    /// At least one vertex is active; another round is needed.
    Continue,
}

/// Per-round bookkeeping, collected by [`run`] into a [`RunLog`]. This is additive
/// diagnostic surface, not part of the core BSP semantics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundSummary {
    /// The round this summary describes.
    pub round: u64,
    /// How many vertices were active (and therefore computed) this round.
    pub computed_vertices: usize,
    /// How many messages were successfully delivered to a live recipient.
    pub delivered_messages: usize,
    /// How many delivery warnings were raised this round: a message group addressed to a
    /// recipient that no longer exists, or an outgoing edge condition that panicked during
    /// broadcast (treated as "do not send" for that edge).
    pub delivery_warnings: usize,
    /// The outcome of this round.
    pub outcome: SuperstepOutcome,
}

/// The ordered log returned alongside a successful [`run`].
pub type RunLog = Vec<RoundSummary>;

/// Run a single superstep (the five phases below) and report whether the graph halted.
///
/// This is also the diagnostic single-round entry point named `execute_superstep`.
/// Equivalent to [`execute_superstep_with`] with `parallel = true`.
pub fn execute_superstep(graph: &Graph) -> Result<SuperstepOutcome> {
    execute_superstep_with(graph, true)
}

/// As [`execute_superstep`], but lets the caller override whether vertex compute/advance
/// fan out across the `parallel` Cargo feature's thread pool (the `EngineConfig::parallel`
/// toggle). Forcing `parallel = false` falls back to sequential iteration even when the
/// feature is compiled in — useful for deterministic single-threaded testing.
pub fn execute_superstep_with(graph: &Graph, parallel: bool) -> Result<SuperstepOutcome> {
    let round = current_round(graph);
    drive_round(graph, round, parallel).map(|summary| summary.outcome)
}

/// Drive `graph` through phases 1-5 until it halts, the superstep budget is exhausted, or
/// the wall-clock timeout elapses — whichever comes first. Equivalent to [`run_with`] with
/// `parallel = true`.
pub fn run(graph: &Graph, max_supersteps: u64, timeout: Duration) -> Result<RunLog> {
    run_with(graph, max_supersteps, timeout, true)
}

/// As [`run`], but lets the caller override the `parallel` toggle per-call.
pub fn run_with(
    graph: &Graph,
    max_supersteps: u64,
    timeout: Duration,
    parallel: bool,
) -> Result<RunLog> {
    let start = Instant::now();
    let mut log = RunLog::new();

    loop {
        let round = current_round(graph);

        if round >= max_supersteps {
            graph.set_state(GraphState::Halted);
            return Err(Error::MaxSuperstepsExceeded { round });
        }
        if start.elapsed() > timeout {
            graph.set_state(GraphState::Halted);
            return Err(Error::TimeoutExceeded { round });
        }

        let summary = drive_round(graph, round, parallel)?;
        let outcome = summary.outcome;
        log.push(summary);

        if outcome == SuperstepOutcome::Halted {
            return Ok(log);
        }
    }
}

/// The round number at which the next superstep begins. Per invariant 7, every vertex's
/// superstep counter is equal at a round boundary, so any vertex's counter (or `0`, for an
/// empty graph) identifies the round.
fn current_round(graph: &Graph) -> u64 {
    graph
        .vertices()
        .read()
        .values()
        .map(|v| v.get_state().superstep)
        .max()
        .unwrap_or(0)
}

/// Transition `graph` into `Running` on its first round, rejecting further work on an
/// already-`Halted` graph: CRUD and re-running are both forbidden post-halt.
fn begin_round(graph: &Graph) -> Result<()> {
    match graph.state() {
        GraphState::Halted => Err(Error::GraphNotBuilding(graph.id().to_string())),
        GraphState::Building => {
            graph.set_state(GraphState::Running);
            Ok(())
        }
        GraphState::Running => Ok(()),
    }
}

fn drive_round(graph: &Graph, round: u64, parallel: bool) -> Result<RoundSummary> {
    begin_round(graph)?;

    let vertices = graph.vertices().read();

    // Phase 1 — Compute. Snapshot the active set at phase entry; vertices activated
    // during this phase do not participate until the next round.
    let active_ids: Vec<VertexId> = vertices
        .iter()
        .filter(|(_, v)| v.is_active())
        .map(|(id, _)| id.clone())
        .collect();
    let computed_vertices = active_ids.len();

    #[cfg(feature = "parallel")]
    let compute_results: Vec<Result<usize>> = if parallel {
        active_ids
            .par_iter()
            .map(|id| {
                vertices
                    .get(id)
                    .expect("id snapshotted from this same read lock")
                    .compute(round)
            })
            .collect()
    } else {
        active_ids
            .iter()
            .map(|id| {
                vertices
                    .get(id)
                    .expect("id snapshotted from this same read lock")
                    .compute(round)
            })
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let compute_results: Vec<Result<usize>> = {
        let _ = parallel;
        active_ids
            .iter()
            .map(|id| {
                vertices
                    .get(id)
                    .expect("id snapshotted from this same read lock")
                    .compute(round)
            })
            .collect()
    };

    let mut condition_panics = 0usize;
    for result in compute_results {
        match result {
            Ok(count) => condition_panics += count,
            Err(err) => {
                drop(vertices);
                graph.set_state(GraphState::Halted);
                return Err(err);
            }
        }
    }

    tracing::debug!(graph_id = %graph.id(), round, computed_vertices, "phase 1 (compute) done");

    // Phase 2 — Drain outboxes. Cross-vertex ordering is unspecified; within a sender,
    // emission order is preserved because each drain returns that vertex's own Vec intact.
    let all_ids: Vec<VertexId> = vertices.keys().cloned().collect();
    let mut drained: Vec<Message> = Vec::new();
    for id in &all_ids {
        let outbox = vertices
            .get(id)
            .expect("id snapshotted from this same read lock")
            .drain_outbox();
        drained.extend(outbox);
    }

    tracing::debug!(graph_id = %graph.id(), round, messages = drained.len(), "phase 2 (drain) done");

    // Phase 3 — Deliver. Group by recipient, preserving each group's encounter order.
    let mut grouped: AHashMap<VertexId, Vec<Message>> = AHashMap::default();
    for message in drained {
        grouped.entry(message.recipient.clone()).or_default().push(message);
    }

    let mut delivered_messages = 0usize;
    let mut delivery_warnings = 0usize;
    for (recipient, messages) in grouped {
        match vertices.get(&recipient) {
            Some(vertex) => {
                delivered_messages += messages.len();
                vertex.receive(messages);
            }
            None => {
                delivery_warnings += 1;
                tracing::warn!(
                    graph_id = %graph.id(),
                    recipient = %recipient,
                    round,
                    "dropping message group: recipient not found"
                );
            }
        }
    }

    delivery_warnings += condition_panics;

    tracing::debug!(graph_id = %graph.id(), round, delivered_messages, delivery_warnings, "phase 3 (deliver) done");

    // Phase 4 — Clear. `drain_outbox` above already emptied every outbox; this pass is an
    // idempotent confirmation that keeps the five phases independently named and observable.
    for vertex in vertices.values() {
        vertex.clear_outbox();
    }

    // Phase 5 — Advance.
    #[cfg(feature = "parallel")]
    {
        if parallel {
            let refs: Vec<_> = vertices.values().collect();
            refs.par_iter().for_each(|v| v.advance());
        } else {
            vertices.values().for_each(|v| v.advance());
        }
    }
    #[cfg(not(feature = "parallel"))]
    {
        vertices.values().for_each(|v| v.advance());
    }

    let halted = !vertices.values().any(|v| v.is_active());
    drop(vertices);

    tracing::debug!(graph_id = %graph.id(), round, halted, "phase 5 (advance) done");

    if halted {
        graph.set_state(GraphState::Halted);
    }

    Ok(RoundSummary {
        round,
        computed_vertices,
        delivered_messages,
        delivery_warnings,
        outcome: if halted {
            SuperstepOutcome::Halted
        } else {
            SuperstepOutcome::Continue
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphId, VertexOptions};
    use crate::value::Value;
    use crate::vertex::{ComputeFn, ComputeResult, VertexType};
    use std::sync::Arc;

    fn graph() -> Graph {
        Graph::new(GraphId::from_raw("g"), "test")
    }

    #[test]
    fn graph_with_no_source_vertex_halts_in_one_round() {
        let g = graph();
        let f: ComputeFn = Arc::new(|_ctx| ComputeResult::Halt);
        g.create_vertex("only", f, VertexOptions::default()).unwrap();
        assert_eq!(execute_superstep(&g).unwrap(), SuperstepOutcome::Halted);
    }

    #[test]
    fn auto_halt_on_empty_inbox_past_superstep_zero() {
        let g = graph();
        let f: ComputeFn = Arc::new(|_ctx| ComputeResult::NewValue(Value::Number(1.0)));
        let mut opts = VertexOptions::default();
        opts.vertex_type = Some(VertexType::Source);
        let id = g.create_vertex("v", f, opts).unwrap();
        assert_eq!(execute_superstep(&g).unwrap(), SuperstepOutcome::Continue);
        // Second round: no new messages arrived, so this vertex auto-halts.
        assert_eq!(execute_superstep(&g).unwrap(), SuperstepOutcome::Halted);
        assert!(!g.get_vertex_state(&id).unwrap().active);
    }

    #[test]
    fn max_supersteps_zero_fails_immediately() {
        let g = graph();
        let f: ComputeFn = Arc::new(|_ctx| ComputeResult::NewValue(Value::Number(1.0)));
        let mut opts = VertexOptions::default();
        opts.vertex_type = Some(VertexType::Source);
        g.create_vertex("v", f, opts).unwrap();

        let err = run(&g, 0, Duration::from_secs(60)).unwrap_err();
        assert_eq!(err, Error::MaxSuperstepsExceeded { round: 0 });
    }

    #[test]
    fn bounded_run_trips_on_a_cycle() {
        let g = graph();
        // Two vertices that re-emit to each other forever.
        let bounce: ComputeFn = Arc::new(|_ctx| ComputeResult::NewValue(Value::Number(1.0)));
        let mut opts = VertexOptions::default();
        opts.vertex_type = Some(VertexType::Source);
        let a = g.create_vertex("a", bounce.clone(), opts).unwrap();
        let b = g
            .create_vertex("b", bounce, VertexOptions::default())
            .unwrap();
        g.create_edge(&a, &b, crate::graph::EdgeOptions::default())
            .unwrap();
        g.create_edge(&b, &a, crate::graph::EdgeOptions::default())
            .unwrap();

        let err = run(&g, 5, Duration::from_secs(60)).unwrap_err();
        assert_eq!(err, Error::MaxSuperstepsExceeded { round: 5 });
    }

    #[test]
    fn explicit_message_is_delivered_next_round() {
        let g = graph();
        let f: ComputeFn = Arc::new(|_ctx| ComputeResult::Halt);
        let a = g.create_vertex("a", f.clone(), VertexOptions::default()).unwrap();
        let b = g.create_vertex("b", f, VertexOptions::default()).unwrap();

        g.send_message(&a, &b, Value::String("hi".into())).unwrap();
        assert_eq!(g.get_vertex_state(&a).unwrap().outgoing_message_count, 1);
        assert_eq!(g.get_vertex_state(&b).unwrap().incoming_message_count, 0);

        execute_superstep(&g).unwrap();

        assert_eq!(g.get_vertex_state(&a).unwrap().outgoing_message_count, 0);
        let b_state = g.get_vertex_state(&b).unwrap();
        assert_eq!(b_state.incoming_message_count, 1);
    }

    #[test]
    fn run_with_parallel_false_matches_default_behavior() {
        let g = graph();
        let f: ComputeFn = Arc::new(|_ctx| ComputeResult::NewValue(Value::Number(1.0)));
        let mut opts = VertexOptions::default();
        opts.vertex_type = Some(VertexType::Source);
        g.create_vertex("v", f, opts).unwrap();

        let log = run_with(&g, 1000, Duration::from_secs(60), false).unwrap();
        assert_eq!(log.len(), 2, "one active round, then an auto-halt round");
    }

    #[test]
    fn panicking_edge_condition_counts_as_a_delivery_warning() {
        let g = graph();
        let f: ComputeFn = Arc::new(|_ctx| ComputeResult::NewValue(Value::Number(1.0)));
        let mut opts = VertexOptions::default();
        opts.vertex_type = Some(VertexType::Source);
        let a = g.create_vertex("a", f, opts).unwrap();
        let b = g
            .create_vertex(
                "b",
                Arc::new(|_ctx| ComputeResult::Halt),
                VertexOptions::default(),
            )
            .unwrap();

        let panicking: crate::edge::Condition = Arc::new(|_ctx| panic!("never send"));
        let mut edge_opts = crate::graph::EdgeOptions::default();
        edge_opts.condition = Some(panicking);
        g.create_edge(&a, &b, edge_opts).unwrap();

        let summary = drive_round(&g, 0, false).unwrap();
        assert_eq!(summary.delivery_warnings, 1);
        assert_eq!(summary.delivered_messages, 0);
    }

    #[test]
    fn auto_broadcast_and_explicit_send_both_land_in_the_same_round() {
        let g = graph();
        // `a` both returns a NewValue (triggering an auto-broadcast to `b` over the live
        // edge) and queues an explicit send to `b` from within the same compute call.
        let a_fn: ComputeFn = Arc::new(|_ctx: ComputeContext| ComputeResult::NewValue(Value::Number(1.0)));
        let mut opts = VertexOptions::default();
        opts.vertex_type = Some(VertexType::Source);
        let a = g.create_vertex("a", a_fn, opts).unwrap();
        let b = g
            .create_vertex(
                "b",
                Arc::new(|_ctx| ComputeResult::Halt),
                VertexOptions::default(),
            )
            .unwrap();
        g.create_edge(&a, &b, crate::graph::EdgeOptions::default())
            .unwrap();

        g.send_message(&a, &b, Value::String("explicit".into()))
            .unwrap();
        assert_eq!(g.get_vertex_state(&a).unwrap().outgoing_message_count, 1);

        execute_superstep(&g).unwrap();

        let b_state = g.get_vertex_state(&b).unwrap();
        assert_eq!(
            b_state.incoming_message_count, 2,
            "both the auto-broadcast and the explicitly queued message should be delivered"
        );
    }

    #[test]
    fn multi_graph_isolation() {
        let a = graph();
        let b = Graph::new(GraphId::from_raw("b"), "other");
        let f: ComputeFn = Arc::new(|_ctx| ComputeResult::Halt);

        let mut opts = VertexOptions::default();
        opts.vertex_type = Some(VertexType::Source);
        a.create_vertex("a1", f.clone(), opts).unwrap();
        a.create_vertex("a2", f.clone(), VertexOptions::default())
            .unwrap();
        let b1 = b.create_vertex("b1", f.clone(), VertexOptions::default()).unwrap();
        b.create_vertex("b2", f, VertexOptions::default()).unwrap();

        run(&a, 1000, Duration::from_secs(60)).unwrap();

        assert_eq!(b.get_vertex_state(&b1).unwrap().superstep, 0);
    }
}
