//! The error hierarchy surfaced at the public API boundary.
//!
//! Every fallible operation in this crate returns a [`Result<T, Error>`] rather than
//! panicking or unwinding past its own boundary — the one exception being a user-supplied
//! compute function, whose panics are caught and converted into [`Error::UserFunctionFailure`]
//! (see [`crate::vertex::VertexActor::compute`]).

use thiserror::Error;

use crate::vertex::VertexId;

/// Errors surfaced by the public API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// No graph with this id is registered.
    #[error("no graph with id `{0}`")]
    GraphNotFound(String),

    /// No vertex with this id exists in the graph.
    #[error("no vertex with id `{0}`")]
    VertexNotFound(VertexId),

    /// No outgoing edge to this target exists on the source vertex.
    #[error("no edge to `{0}`")]
    EdgeNotFound(VertexId),

    /// The graph has no vertex of type `final`.
    #[error("graph has no final vertex")]
    FinalVertexNotFound,

    /// `create_edge` referenced a vertex that does not exist in this graph.
    #[error("edge endpoint `{0}` does not exist in this graph")]
    EdgeEndpointMissing(VertexId),

    /// Vertex/edge CRUD was attempted while the graph was not in the `Building` state.
    #[error("graph `{0}` is not accepting structural changes (already running or halted)")]
    GraphNotBuilding(String),

    /// A graph may hold at most one vertex of type `final` (invariant 5).
    #[error("graph `{0}` already has a final vertex")]
    DuplicateFinalVertex(String),

    /// `run` exhausted its superstep budget before the graph halted.
    #[error("exceeded max_supersteps ({round} rounds) without halting")]
    MaxSuperstepsExceeded {
        /// The round number at which the budget was exhausted.
        round: u64,
    },

    /// `run` exceeded its wall-clock budget before the graph halted.
    #[error("exceeded timeout after round {round}")]
    TimeoutExceeded {
        /// The last round completed before the timeout fired.
        round: u64,
    },

    /// A user-supplied compute function panicked.
    #[error("compute function for vertex `{vertex_id}` panicked during round {round}")]
    UserFunctionFailure {
        /// The vertex whose compute function failed.
        vertex_id: VertexId,
        /// The round in progress when the failure occurred.
        round: u64,
    },
}

/// Convenience alias used throughout this crate's public API.
pub type Result<T> = std::result::Result<T, Error>;
