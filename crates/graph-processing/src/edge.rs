//! Edges connect vertices and carry the weight, properties, and optional send-predicate
//! that gate whether a compute step's outgoing message actually gets emitted.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::vertex::{ComputeContext, VertexId};

/// A predicate evaluated against a vertex's [`ComputeContext`] at message-emission time.
///
/// Returning `true` (or the edge having no condition at all) sends the message; returning
/// `false`, or the predicate panicking, suppresses it. A panicking condition is caught at
/// the send site and treated as "never send" — see [`crate::graph::Graph::execute_superstep`].
pub type Condition = Arc<dyn Fn(&ComputeContext) -> bool + Send + Sync>;

/// An immutable directed edge from one vertex to another.
///
/// `weight` and `properties` are carried for the user function's benefit (they appear on
/// [`ComputeContext::outgoing_edges`]); the engine itself does not interpret them.
#[derive(Clone)]
pub struct Edge {
    /// The vertex this edge originates from.
    pub source: VertexId,
    /// The vertex this edge points to.
    pub target: VertexId,
    /// A numeric weight, defaulting to `1.0`.
    pub weight: f64,
    /// Arbitrary properties attached to this edge, defaulting to empty.
    pub properties: IndexMap<String, crate::value::Value>,
    /// An optional predicate gating whether a compute step sends along this edge.
    /// Absent means "always send".
    pub condition: Option<Condition>,
}

impl Edge {
    /// Construct a new edge with the default weight (`1.0`) and no properties or condition.
    pub fn new(source: VertexId, target: VertexId) -> Self {
        Self {
            source,
            target,
            weight: 1.0,
            properties: IndexMap::new(),
            condition: None,
        }
    }

    /// Set the edge's weight, returning `self` for chaining.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the edge's properties, returning `self` for chaining.
    pub fn with_properties(mut self, properties: IndexMap<String, crate::value::Value>) -> Self {
        self.properties = properties;
        self
    }

    /// Set the edge's send-predicate, returning `self` for chaining.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Evaluate this edge's condition, if any, against a compute context.
    ///
    /// A condition that panics is caught and treated as `false` ("never send") — callers
    /// that need to know whether a panic occurred should use
    /// [`Edge::try_should_send`] instead.
    pub fn should_send(&self, ctx: &ComputeContext) -> bool {
        self.try_should_send(ctx).unwrap_or(false)
    }

    /// Evaluate this edge's condition, if any, catching a panic instead of suppressing it
    /// silently. `Ok(true)` means send unconditionally or the predicate returned `true`.
    /// `Err(())` means the predicate panicked; the caller should log a delivery warning.
    pub fn try_should_send(&self, ctx: &ComputeContext) -> Result<bool, ()> {
        match &self.condition {
            None => Ok(true),
            Some(condition) => {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| condition(ctx)))
                    .map_err(|_| ())
            }
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("weight", &self.weight)
            .field("properties", &self.properties)
            .field("condition", &self.condition.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
