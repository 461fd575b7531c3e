//! Fault conditions and the fault table
//!
//! A fault targets a node by its *display name*, not its id. Renaming a node
//! therefore detaches its faults; the matching rule is kept for compatibility
//! with existing fault definitions.

use std::fmt;
use std::str::FromStr;

use busview_protocol::{ErrorFlag, ParseError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SimError;

/// Unique identifier for a fault in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaultId(pub u32);

impl fmt::Display for FaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault_{}", self.0)
    }
}

impl FromStr for FaultId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        s.strip_prefix("fault_").unwrap_or(s).parse().map(FaultId)
    }
}

/// Kind of anomaly a fault injects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
    BitError,
    BusOff,
    DominantFlip,
    Timeout,
    DropMessage,
    DelayMessage,
    DuplicateMessage,
    CorruptCrc,
    ShortCircuit,
}

impl FaultType {
    /// All fault types
    pub const ALL: [FaultType; 9] = [
        FaultType::BitError,
        FaultType::BusOff,
        FaultType::DominantFlip,
        FaultType::Timeout,
        FaultType::DropMessage,
        FaultType::DelayMessage,
        FaultType::DuplicateMessage,
        FaultType::CorruptCrc,
        FaultType::ShortCircuit,
    ];

    /// Snake-case name
    pub fn name(&self) -> &'static str {
        match self {
            FaultType::BitError => "bit_error",
            FaultType::BusOff => "bus_off",
            FaultType::DominantFlip => "dominant_flip",
            FaultType::Timeout => "timeout",
            FaultType::DropMessage => "drop_message",
            FaultType::DelayMessage => "delay_message",
            FaultType::DuplicateMessage => "duplicate_message",
            FaultType::CorruptCrc => "corrupt_crc",
            FaultType::ShortCircuit => "short_circuit",
        }
    }

    /// Per-message chance that this fault fires, and the flag it leaves
    ///
    /// Fault types without a frame-level effect return `None`.
    pub fn effect(&self) -> Option<(f64, ErrorFlag)> {
        match self {
            FaultType::BitError => Some((0.1, ErrorFlag::BitError)),
            FaultType::CorruptCrc => Some((0.2, ErrorFlag::CrcError)),
            FaultType::BusOff => Some((0.05, ErrorFlag::BusOff)),
            FaultType::DominantFlip
            | FaultType::Timeout
            | FaultType::DropMessage
            | FaultType::DelayMessage
            | FaultType::DuplicateMessage
            | FaultType::ShortCircuit => None,
        }
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FaultType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().replace('-', "_");
        FaultType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(&needle))
            .ok_or_else(|| ParseError::UnknownFaultType(s.trim().to_string()))
    }
}

/// How serious a fault is (informational)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, least severe first
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Lower-case name
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Severity::ALL
            .into_iter()
            .find(|sev| sev.name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ParseError::UnknownSeverity(needle.to_string()))
    }
}

/// A configurable anomaly condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Unique id
    pub id: FaultId,
    /// Anomaly kind
    pub fault_type: FaultType,
    /// Display name of the node this fault applies to
    pub target: String,
    /// Informational severity
    pub severity: Severity,
    /// Whether the fault currently applies
    pub active: bool,
    /// Free-text description
    pub description: String,
}

impl Fault {
    /// Whether this fault applies to frames from the named sender
    pub fn matches(&self, sender: &str) -> bool {
        self.active && self.target == sender
    }
}

/// In-memory, ordered list of faults
#[derive(Debug, Clone, Default)]
pub struct FaultTable {
    faults: Vec<Fault>,
    next_id: u32,
}

impl FaultTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            faults: Vec::new(),
            next_id: 1,
        }
    }

    /// Add an inactive fault
    pub fn add_fault(
        &mut self,
        fault_type: FaultType,
        target: &str,
        severity: Severity,
        description: &str,
    ) -> Result<&Fault, SimError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(SimError::EmptyFaultDescription);
        }

        let id = FaultId(self.next_id.max(1));
        self.next_id = id.0 + 1;

        info!("Added fault {} ({}) targeting {:?}", id, fault_type, target);
        self.faults.push(Fault {
            id,
            fault_type,
            target: target.to_string(),
            severity,
            active: false,
            description: description.to_string(),
        });
        Ok(&self.faults[self.faults.len() - 1])
    }

    /// Flip a fault's active flag, returning the new state
    pub fn toggle_fault(&mut self, id: FaultId) -> Result<bool, SimError> {
        let fault = self
            .faults
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(SimError::FaultNotFound(id))?;
        fault.active = !fault.active;
        info!(
            "Fault {} ({} on {:?}) {}",
            fault.id,
            fault.fault_type,
            fault.target,
            if fault.active { "activated" } else { "deactivated" }
        );
        Ok(fault.active)
    }

    /// Delete a fault
    pub fn remove_fault(&mut self, id: FaultId) -> Result<Fault, SimError> {
        let index = self
            .faults
            .iter()
            .position(|f| f.id == id)
            .ok_or(SimError::FaultNotFound(id))?;
        let fault = self.faults.remove(index);
        info!("Removed fault {} ({})", fault.id, fault.fault_type);
        Ok(fault)
    }

    /// Get a fault by id
    pub fn get(&self, id: FaultId) -> Option<&Fault> {
        self.faults.iter().find(|f| f.id == id)
    }

    /// Active faults matching a sender, in table order
    pub fn active_for<'a>(&'a self, sender: &'a str) -> impl Iterator<Item = &'a Fault> + 'a {
        self.faults.iter().filter(move |f| f.matches(sender))
    }

    /// Iterate over all faults in table order
    pub fn iter(&self) -> impl Iterator<Item = &Fault> {
        self.faults.iter()
    }

    /// Number of faults
    pub fn len(&self) -> usize {
        self.faults.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    /// Clone all faults
    pub fn to_vec(&self) -> Vec<Fault> {
        self.faults.clone()
    }
}
