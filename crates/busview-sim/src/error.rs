//! Error types for the simulator

use thiserror::Error;

use crate::fault::FaultId;
use crate::node::NodeId;

/// Errors that can occur while operating on a simulation session
///
/// Unknown node or fault references are reported rather than ignored, so the
/// console can tell the user their command had no effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Node name was empty or whitespace
    #[error("node name must not be empty")]
    EmptyNodeName,

    /// Fault description was empty or whitespace
    #[error("fault description must not be empty")]
    EmptyFaultDescription,

    /// Node not found
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Fault not found
    #[error("fault not found: {0}")]
    FaultNotFound(FaultId),

    /// Signal not carried by the node's kind
    #[error("node {node} has no signal named {signal}")]
    UnknownSignal {
        /// Node that was addressed
        node: NodeId,
        /// Requested signal name
        signal: String,
    },

    /// Invalid name for an enumerated value
    #[error(transparent)]
    Parse(#[from] busview_protocol::ParseError),

    /// The session task is no longer running
    #[error("simulation session closed")]
    SessionClosed,
}
