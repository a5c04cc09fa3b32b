//! The process-wide directory of live graphs: a supervisor that owns graph lifetimes and
//! is the sole entry point for `create_graph`/`stop_graph`/`run`.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::engine::{self, RunLog, SuperstepOutcome};
use crate::error::{Error, Result};
use crate::graph::{Graph, GraphId};

/// Owns every live [`Graph`] in the process, keyed by its [`GraphId`].
///
/// The directory itself is the only shared mutable structure in this crate; it is touched
/// only at `create_graph`/`stop_graph` time; the graphs it hands out are otherwise
/// independent and manage their own internal locking.
pub struct Registry {
    config: EngineConfig,
    graphs: RwLock<AHashMap<GraphId, Arc<Graph>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry with the default [`EngineConfig`].
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty registry using `config` for any `run` call that doesn't override its
    /// superstep/timeout budget.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            graphs: RwLock::new(AHashMap::default()),
        }
    }

    /// Create a new, empty graph in the `Building` state and register it under a freshly
    /// minted id.
    pub fn create_graph(&self, name: impl Into<String>) -> (GraphId, Arc<Graph>) {
        let id = GraphId::generate();
        let graph = Arc::new(Graph::new(id.clone(), name));
        self.graphs.write().insert(id.clone(), graph.clone());
        tracing::debug!(graph_id = %id, "graph created");
        (id, graph)
    }

    /// Remove a graph from the registry. The graph itself (and any handle a caller still
    /// holds) remains valid; only the registry's own entry is dropped.
    pub fn stop_graph(&self, id: &GraphId) -> Result<()> {
        self.graphs
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::GraphNotFound(id.to_string()))
    }

    /// Look up a registered graph by id.
    pub fn get_graph(&self, id: &GraphId) -> Result<Arc<Graph>> {
        self.graphs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::GraphNotFound(id.to_string()))
    }

    /// Every graph currently registered. Ordering is unspecified.
    pub fn list_graphs(&self) -> Vec<Arc<Graph>> {
        self.graphs.read().values().cloned().collect()
    }

    /// The number of graphs currently registered.
    pub fn graph_count(&self) -> usize {
        self.graphs.read().len()
    }

    /// Run a registered graph to termination, using this registry's configured defaults.
    pub fn run(&self, id: &GraphId) -> Result<RunLog> {
        let graph = self.get_graph(id)?;
        engine::run_with(
            &graph,
            self.config.max_supersteps,
            self.config.timeout,
            self.config.parallel,
        )
    }

    /// Run a registered graph to termination with an explicit budget, overriding this
    /// registry's configured max-supersteps/timeout (the `parallel` toggle still comes
    /// from this registry's configured defaults).
    pub fn run_with_budget(
        &self,
        id: &GraphId,
        max_supersteps: u64,
        timeout: std::time::Duration,
    ) -> Result<RunLog> {
        let graph = self.get_graph(id)?;
        engine::run_with(&graph, max_supersteps, timeout, self.config.parallel)
    }

    /// Run a single superstep of a registered graph directly.
    pub fn execute_superstep(&self, id: &GraphId) -> Result<SuperstepOutcome> {
        let graph = self.get_graph(id)?;
        engine::execute_superstep_with(&graph, self.config.parallel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VertexOptions;
    use crate::vertex::{ComputeFn, ComputeResult};
    use std::sync::Arc as StdArc;

    fn halting_fn() -> ComputeFn {
        StdArc::new(|_ctx| ComputeResult::Halt)
    }

    #[test]
    fn create_then_stop_graph_round_trips() {
        let registry = Registry::new();
        let (id, _graph) = registry.create_graph("g");
        assert_eq!(registry.graph_count(), 1);
        registry.stop_graph(&id).unwrap();
        assert_eq!(registry.graph_count(), 0);
    }

    #[test]
    fn with_config_honors_sequential_toggle() {
        let mut config = crate::config::EngineConfig::default();
        config.parallel = false;
        let registry = Registry::with_config(config);
        let (id, graph) = registry.create_graph("sequential");
        graph
            .create_vertex("only", halting_fn(), VertexOptions::default())
            .unwrap();
        assert_eq!(
            registry.execute_superstep(&id).unwrap(),
            crate::engine::SuperstepOutcome::Halted
        );
    }

    #[test]
    fn stop_unknown_graph_is_an_error() {
        let registry = Registry::new();
        let id = GraphId::from_raw("missing");
        assert!(matches!(
            registry.stop_graph(&id),
            Err(Error::GraphNotFound(_))
        ));
    }

    #[test]
    fn multiple_graphs_are_independently_tracked() {
        let registry = Registry::new();
        let (id_a, graph_a) = registry.create_graph("a");
        let (id_b, _graph_b) = registry.create_graph("b");
        assert_ne!(id_a, id_b);
        assert_eq!(registry.graph_count(), 2);

        graph_a
            .create_vertex("only", halting_fn(), VertexOptions::default())
            .unwrap();
        registry.run(&id_a).unwrap();
        assert_eq!(registry.get_graph(&id_b).unwrap().vertex_count(), 0);
    }
}
