//! Virtual ECU nodes and the node registry

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use busview_protocol::{NodeKind, ParseError, Protocol};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SimError;

/// Unique identifier for a node in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Get the raw handle value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ecu_{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        s.strip_prefix("ecu_").unwrap_or(s).parse().map(NodeId)
    }
}

/// Operational status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Node emits traffic every tick it wins the emission draw
    #[default]
    Active,
    /// Node is silent
    Inactive,
    /// Node is in an error state and silent
    Error,
    /// Node has left the bus and is silent
    BusOff,
}

impl NodeStatus {
    /// All statuses
    pub const ALL: [NodeStatus; 4] = [
        NodeStatus::Active,
        NodeStatus::Inactive,
        NodeStatus::Error,
        NodeStatus::BusOff,
    ];

    /// Lower-case name
    pub fn name(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Inactive => "inactive",
            NodeStatus::Error => "error",
            NodeStatus::BusOff => "bus-off",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NodeStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        NodeStatus::ALL
            .into_iter()
            .find(|st| st.name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ParseError::UnknownStatus(needle.to_string()))
    }
}

/// One virtual ECU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable unique id
    pub id: NodeId,
    /// Display name, also the key faults are matched against
    pub name: String,
    /// ECU category (selects the signal table)
    pub kind: NodeKind,
    /// Bus protocol
    pub protocol: Protocol,
    /// Operational status
    pub status: NodeStatus,
    /// Current value of every signal in the kind's table
    pub parameters: BTreeMap<String, f64>,
}

impl Node {
    /// Create a node with every signal at the midpoint of its range
    pub fn new(id: NodeId, name: String, kind: NodeKind, protocol: Protocol) -> Self {
        let parameters = kind
            .signals()
            .iter()
            .map(|spec| (spec.name.to_string(), spec.midpoint()))
            .collect();

        Self {
            id,
            name,
            kind,
            protocol,
            status: NodeStatus::Active,
            parameters,
        }
    }

    /// Whether this node takes part in ticks
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    /// Current value of a signal
    pub fn parameter(&self, signal: &str) -> Option<f64> {
        self.parameters.get(signal).copied()
    }

    /// Store a signal value, clamped to its declared range
    ///
    /// Returns the stored value, or `None` if the kind has no such signal.
    pub fn set_parameter(&mut self, signal: &str, value: f64) -> Option<f64> {
        let spec = self.kind.signal(signal)?;
        let clamped = spec.clamp(value);
        self.parameters.insert(spec.name.to_string(), clamped);
        Some(clamped)
    }
}

/// Startup nodes: name, kind, protocol and starting signal values
const DEFAULT_NODES: &[(&str, NodeKind, Protocol, &[(&str, f64)])] = &[
    (
        "Engine ECU",
        NodeKind::Engine,
        Protocol::Can,
        &[
            ("rpm", 2500.0),
            ("coolantTemp", 85.0),
            ("throttlePosition", 45.0),
            ("oilPressure", 4.2),
        ],
    ),
    (
        "Anti-lock Brake System",
        NodeKind::Brake,
        Protocol::Can,
        &[
            ("brakePressure", 12.0),
            ("wheelSpeed_FL", 75.0),
            ("wheelSpeed_FR", 75.0),
            ("absActive", 0.0),
        ],
    ),
    (
        "Central Gateway",
        NodeKind::Gateway,
        Protocol::CanFd,
        &[("busLoad", 35.0), ("errorCount", 2.0), ("messageRate", 450.0)],
    ),
    (
        "Body Control Module",
        NodeKind::BodyControl,
        Protocol::Lin,
        &[
            ("leftTurnSignal", 0.0),
            ("rightTurnSignal", 0.0),
            ("headlights", 1.0),
            ("doorStatus", 0.0),
        ],
    ),
];

/// In-memory list of virtual ECUs
///
/// Nodes are never removed; ids are allocated monotonically.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
    next_id: u32,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            next_id: 1,
        }
    }

    /// Add the four startup nodes
    pub fn seed_defaults(&mut self) {
        for (name, kind, protocol, values) in DEFAULT_NODES {
            let id = match self.add_node(name, *kind, *protocol) {
                Ok(node) => node.id,
                Err(_) => continue,
            };
            if let Some(node) = self.get_mut(id) {
                for (signal, value) in values.iter() {
                    node.set_parameter(signal, *value);
                }
            }
        }
    }

    /// Add a node with every signal at its range midpoint
    ///
    /// Duplicate names are permitted.
    pub fn add_node(
        &mut self,
        name: &str,
        kind: NodeKind,
        protocol: Protocol,
    ) -> Result<&Node, SimError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SimError::EmptyNodeName);
        }

        // Default::default() leaves next_id at 0
        let id = NodeId(self.next_id.max(1));
        self.next_id = id.0 + 1;

        info!("Added node: {} ({}, {}) as {}", name, kind, protocol, id);
        self.nodes
            .push(Node::new(id, name.to_string(), kind, protocol));
        Ok(&self.nodes[self.nodes.len() - 1])
    }

    /// Change a node's status (idempotent)
    ///
    /// Returns whether the status actually changed.
    pub fn set_status(&mut self, id: NodeId, status: NodeStatus) -> Result<bool, SimError> {
        let node = self.get_mut(id).ok_or(SimError::NodeNotFound(id))?;
        if node.status == status {
            return Ok(false);
        }
        debug!("Node {} status {} -> {}", node.name, node.status, status);
        node.status = status;
        Ok(true)
    }

    /// Set one signal value on a node, clamped to its range
    pub fn set_parameter(&mut self, id: NodeId, signal: &str, value: f64) -> Result<f64, SimError> {
        let node = self.get_mut(id).ok_or(SimError::NodeNotFound(id))?;
        node.set_parameter(signal, value)
            .ok_or_else(|| SimError::UnknownSignal {
                node: id,
                signal: signal.to_string(),
            })
    }

    /// Get a node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Get a mutable node by id
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// First node with the given display name
    pub fn find_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Iterate over all nodes in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Clone all nodes
    pub fn to_vec(&self) -> Vec<Node> {
        self.nodes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_node_initializes_midpoints() {
        let mut registry = NodeRegistry::new();
        let node = registry
            .add_node("Test ECU", NodeKind::Sensor, Protocol::Can)
            .unwrap();

        assert_eq!(node.name, "Test ECU");
        assert_eq!(node.status, NodeStatus::Active);
        assert_eq!(node.parameters.len(), NodeKind::Sensor.signals().len());
        for spec in NodeKind::Sensor.signals() {
            assert_eq!(node.parameter(spec.name), Some(spec.midpoint()));
        }
        assert_eq!(node.parameter("ambientTemp"), Some(10.0));
    }

    #[test]
    fn test_add_node_rejects_empty_name() {
        let mut registry = NodeRegistry::new();
        assert_eq!(
            registry.add_node("   ", NodeKind::Engine, Protocol::Can).unwrap_err(),
            SimError::EmptyNodeName
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_names_get_distinct_ids() {
        let mut registry = NodeRegistry::new();
        let a = registry.add_node("Twin", NodeKind::Custom, Protocol::Lin).unwrap().id;
        let b = registry.add_node("Twin", NodeKind::Custom, Protocol::Lin).unwrap().id;
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_default_registry_allocates_from_one() {
        let mut registry = NodeRegistry::default();
        let id = registry.add_node("A", NodeKind::Engine, Protocol::Can).unwrap().id;
        assert_eq!(id, NodeId(1));
    }

    #[test]
    fn test_set_status_is_idempotent() {
        let mut registry = NodeRegistry::new();
        let id = registry.add_node("A", NodeKind::Engine, Protocol::Can).unwrap().id;

        assert!(registry.set_status(id, NodeStatus::Inactive).unwrap());
        assert!(!registry.set_status(id, NodeStatus::Inactive).unwrap());
        assert_eq!(registry.get(id).unwrap().status, NodeStatus::Inactive);
        assert!(!registry.get(id).unwrap().is_active());
    }

    #[test]
    fn test_set_status_unknown_node() {
        let mut registry = NodeRegistry::new();
        assert_eq!(
            registry.set_status(NodeId(99), NodeStatus::Error),
            Err(SimError::NodeNotFound(NodeId(99)))
        );
    }

    #[test]
    fn test_set_parameter_clamps() {
        let mut registry = NodeRegistry::new();
        let id = registry.add_node("A", NodeKind::Engine, Protocol::Can).unwrap().id;

        assert_eq!(registry.set_parameter(id, "rpm", 99_999.0), Ok(6500.0));
        assert_eq!(registry.set_parameter(id, "rpm", -5.0), Ok(800.0));
        assert!(matches!(
            registry.set_parameter(id, "humidity", 1.0),
            Err(SimError::UnknownSignal { .. })
        ));
    }

    #[test]
    fn test_seed_defaults() {
        let mut registry = NodeRegistry::new();
        registry.seed_defaults();

        assert_eq!(registry.len(), 4);
        let engine = registry.find_by_name("Engine ECU").unwrap();
        assert_eq!(engine.kind, NodeKind::Engine);
        assert_eq!(engine.parameter("rpm"), Some(2500.0));
        // Signals without a seeded value keep the midpoint
        assert_eq!(engine.parameter("fuelLevel"), Some(50.0));

        let gateway = registry.find_by_name("Central Gateway").unwrap();
        assert_eq!(gateway.protocol, Protocol::CanFd);
        assert!(registry.iter().all(Node::is_active));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Bus-Off".parse::<NodeStatus>().unwrap(), NodeStatus::BusOff);
        assert!("sleeping".parse::<NodeStatus>().is_err());
        assert_eq!("ecu_4".parse::<NodeId>().unwrap(), NodeId(4));
        assert_eq!("4".parse::<NodeId>().unwrap(), NodeId(4));
    }
}
