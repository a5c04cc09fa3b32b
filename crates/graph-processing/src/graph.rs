//! A [`Graph`] owns a set of vertices keyed by opaque id and exposes CRUD for vertices and
//! edges. The superstep engine that drives a graph through BSP rounds lives in
//! [`crate::engine`]; this module is just the directory and the structural mutations.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::edge::{Condition, Edge};
use crate::error::{Error, Result};
use crate::value::Value;
use crate::vertex::{ComputeFn, VertexActor, VertexId, VertexSnapshot, VertexType};

/// Uniquely identifies a graph within a [`crate::registry::Registry`].
///
/// Minted by [`crate::registry::Registry::create_graph`] the same way [`VertexId`] is
/// minted — it only needs to be unique among live graphs, not supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphId(String);

impl GraphId {
    /// Namespace prefix every generated id carries.
    const PREFIX: &'static str = "graph.";

    /// Mint a fresh, cryptographically random graph id.
    pub(crate) fn generate() -> Self {
        GraphId(format!("{}{}", Self::PREFIX, Uuid::new_v4().simple()))
    }

    /// Wrap an already-known id string, e.g. one received from
    /// [`crate::registry::Registry::create_graph`] and threaded back into a later call,
    /// or used by tests that need a stable, human-readable id.
    pub fn from_raw(id: impl Into<String>) -> Self {
        GraphId(id.into())
    }

    /// Borrow the id as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A graph's position in its own lifecycle.
///
/// Vertex/edge CRUD is only accepted while `Building`. `Halted` is treated the same as
/// `Running` for CRUD purposes — once a graph has run, its vertex/edge set is frozen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphState {
    /// Accepting vertex/edge CRUD; the engine has not yet been invoked.
    Building,
    /// The superstep engine is actively driving this graph; CRUD is forbidden.
    Running,
    /// The engine has terminated (successfully or not); state remains readable but CRUD
    /// stays forbidden.
    Halted,
}

/// Options recognized by [`Graph::create_vertex`].
#[derive(Default)]
pub struct VertexOptions {
    /// The vertex's initial value. Defaults to [`Value::Nil`] if omitted.
    pub value: Option<Value>,
    /// The vertex's role. Defaults to [`VertexType::Normal`] if omitted.
    pub vertex_type: Option<VertexType>,
}

/// Options recognized by [`Graph::create_edge`].
#[derive(Default)]
pub struct EdgeOptions {
    /// The edge's weight. Defaults to `1.0` if omitted.
    pub weight: Option<f64>,
    /// The edge's properties. Defaults to empty if omitted.
    pub properties: Option<indexmap::IndexMap<String, Value>>,
    /// The edge's send-predicate. Defaults to "always send" if omitted.
    pub condition: Option<Condition>,
}

/// One graph: a directory of vertices plus the structural operations on them.
///
/// Vertex lookups go through a single `RwLock`-guarded `BTreeMap`: read-mostly after the
/// `Building` phase, with a `BTreeMap` in place of a hash map specifically so the
/// superstep engine's phases iterate vertices in a stable order run to run.
pub struct Graph {
    id: GraphId,
    name: String,
    state: RwLock<GraphState>,
    vertices: RwLock<BTreeMap<VertexId, VertexActor>>,
    has_final_vertex: RwLock<bool>,
}

impl Graph {
    /// Create a new, empty graph in the `Building` state.
    pub fn new(id: GraphId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: RwLock::new(GraphState::Building),
            vertices: RwLock::new(BTreeMap::new()),
            has_final_vertex: RwLock::new(false),
        }
    }

    /// This graph's id.
    pub fn id(&self) -> &GraphId {
        &self.id
    }

    /// This graph's human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This graph's current lifecycle state.
    pub fn state(&self) -> GraphState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: GraphState) {
        *self.state.write() = state;
    }

    fn ensure_building(&self) -> Result<()> {
        match self.state() {
            GraphState::Building => Ok(()),
            _ => Err(Error::GraphNotBuilding(self.id.to_string())),
        }
    }

    /// Create a new vertex, returning its freshly minted id.
    ///
    /// Rejects a second `final`-typed vertex (invariant 5) and any CRUD once the graph has
    /// left the `Building` state.
    pub fn create_vertex(
        &self,
        name: impl Into<String>,
        function: ComputeFn,
        options: VertexOptions,
    ) -> Result<VertexId> {
        self.ensure_building()?;

        let vertex_type = options.vertex_type.unwrap_or(VertexType::Normal);
        if vertex_type == VertexType::Final {
            let mut has_final = self.has_final_vertex.write();
            if *has_final {
                return Err(Error::DuplicateFinalVertex(self.id.to_string()));
            }
            *has_final = true;
        }

        let id = VertexId::generate();
        let actor = VertexActor::new(
            self.id.clone(),
            id.clone(),
            name.into(),
            vertex_type,
            function,
            options.value,
        );
        self.vertices.write().insert(id.clone(), actor);
        tracing::debug!(graph_id = %self.id, vertex_id = %id, "vertex created");
        Ok(id)
    }

    /// Remove a vertex from this graph. Other vertices' edges toward it are left in place
    /// and resolve as delivery warnings at send time.
    pub fn stop_vertex(&self, id: &VertexId) -> Result<()> {
        self.ensure_building()?;
        let mut vertices = self.vertices.write();
        let removed = vertices
            .remove(id)
            .ok_or_else(|| Error::VertexNotFound(id.clone()))?;
        if removed.vertex_type == VertexType::Final {
            *self.has_final_vertex.write() = false;
        }
        Ok(())
    }

    /// Look up a vertex's current snapshot.
    pub fn get_vertex_state(&self, id: &VertexId) -> Result<VertexSnapshot> {
        self.with_vertex(id, |v| v.get_state())
    }

    /// Snapshots of every vertex in this graph, in id order.
    pub fn list_vertices(&self) -> Vec<VertexSnapshot> {
        self.vertices.read().values().map(|v| v.get_state()).collect()
    }

    /// The number of vertices currently in this graph.
    pub fn vertex_count(&self) -> usize {
        self.vertices.read().len()
    }

    /// Create a directed edge from `from` to `to`. Both endpoints must already exist.
    pub fn create_edge(
        &self,
        from: &VertexId,
        to: &VertexId,
        options: EdgeOptions,
    ) -> Result<()> {
        self.ensure_building()?;
        let vertices = self.vertices.read();
        vertices
            .get(to)
            .ok_or_else(|| Error::EdgeEndpointMissing(to.clone()))?;
        let source = vertices
            .get(from)
            .ok_or_else(|| Error::EdgeEndpointMissing(from.clone()))?;

        let mut edge = Edge::new(from.clone(), to.clone());
        if let Some(weight) = options.weight {
            edge = edge.with_weight(weight);
        }
        if let Some(properties) = options.properties {
            edge = edge.with_properties(properties);
        }
        if let Some(condition) = options.condition {
            edge = edge.with_condition(condition);
        }
        source.add_outgoing_edge(edge);
        Ok(())
    }

    /// Remove the edge from `from` to `to`, if any.
    pub fn remove_edge(&self, from: &VertexId, to: &VertexId) -> Result<()> {
        self.ensure_building()?;
        self.with_vertex(from, |v| v.remove_outgoing_edge(to))?
    }

    /// The outgoing edges of a single vertex, in insertion order.
    pub fn get_vertex_edges(&self, id: &VertexId) -> Result<Vec<Edge>> {
        self.with_vertex(id, |v| v.get_outgoing_edges())
    }

    /// The ids of a single vertex's neighbors, in insertion order.
    pub fn get_vertex_neighbors(&self, id: &VertexId) -> Result<Vec<VertexId>> {
        self.with_vertex(id, |v| v.get_neighbors())
    }

    /// Every edge in the graph: the concatenation of each vertex's outgoing edges.
    /// Ordering between vertices is unspecified.
    pub fn list_edges(&self) -> Vec<Edge> {
        self.vertices
            .read()
            .values()
            .flat_map(|v| v.get_outgoing_edges())
            .collect()
    }

    /// Enqueue an explicit message from `from` to `to` into the sender's outbox.
    pub fn send_message(&self, from: &VertexId, to: &VertexId, content: Value) -> Result<()> {
        let vertices = self.vertices.read();
        vertices
            .get(to)
            .ok_or_else(|| Error::VertexNotFound(to.clone()))?;
        let sender = vertices
            .get(from)
            .ok_or_else(|| Error::VertexNotFound(from.clone()))?;
        sender.enqueue_outbox(to.clone(), content);
        Ok(())
    }

    /// Look up the unique `final`-typed vertex, if any.
    pub fn get_final_value(&self) -> Result<VertexSnapshot> {
        self.vertices
            .read()
            .values()
            .find(|v| v.vertex_type == VertexType::Final)
            .map(|v| v.get_state())
            .ok_or(Error::FinalVertexNotFound)
    }

    /// Look up a single vertex actor, applying `f` to it under the registry's read lock.
    pub(crate) fn with_vertex<T>(
        &self,
        id: &VertexId,
        f: impl FnOnce(&VertexActor) -> T,
    ) -> Result<T> {
        let vertices = self.vertices.read();
        let vertex = vertices
            .get(id)
            .ok_or_else(|| Error::VertexNotFound(id.clone()))?;
        Ok(f(vertex))
    }

    /// Run a single vertex's compute step directly, bypassing the superstep engine's
    /// barrier. A diagnostic operation; the condition-panic count `compute` returns is
    /// discarded here since there is no enclosing round to fold it into.
    pub fn compute_vertex(&self, id: &VertexId) -> Result<()> {
        let vertices = self.vertices.read();
        let vertex = vertices
            .get(id)
            .ok_or_else(|| Error::VertexNotFound(id.clone()))?;
        let round = vertex.get_state().superstep;
        vertex.compute(round).map(|_| ())
    }

    pub(crate) fn vertices(&self) -> &RwLock<BTreeMap<VertexId, VertexActor>> {
        &self.vertices
    }
}
