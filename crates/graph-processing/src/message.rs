//! Messages are how vertices in a graph communicate with each other between supersteps.
//!
//! Every message is the same concrete [`Message`] struct; the payload itself is
//! dynamically typed via [`crate::value::Value`], so a compute function can send or
//! receive any of the value categories without a caller-defined message type per shape.

use chrono::{DateTime, Utc};

use crate::vertex::VertexId;

/// An immutable message sent from one vertex to another.
///
/// A message's `superstep` is fixed at construction to the sender's superstep at send
/// time (invariant 3); `timestamp` is captured for diagnostics only and carries no
/// ordering semantics beyond that superstep number.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// The vertex that sent this message.
    pub sender: VertexId,
    /// The vertex this message is addressed to.
    pub recipient: VertexId,
    /// The message payload.
    pub content: crate::value::Value,
    /// The sender's superstep counter at the time this message was created.
    pub superstep: u64,
    /// Wall-clock creation time, for diagnostics only.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Construct a new message. `timestamp` is stamped as the current wall-clock time.
    pub fn new(
        sender: VertexId,
        recipient: VertexId,
        content: crate::value::Value,
        superstep: u64,
    ) -> Self {
        Self {
            sender,
            recipient,
            content,
            superstep,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn id(s: &str) -> VertexId {
        VertexId::from_raw(s.to_string())
    }

    #[test]
    fn superstep_is_fixed_at_construction() {
        let msg = Message::new(id("vtx.a"), id("vtx.b"), Value::Number(1.0), 7);
        assert_eq!(msg.superstep, 7);
        assert_eq!(msg.sender, id("vtx.a"));
        assert_eq!(msg.recipient, id("vtx.b"));
    }
}
