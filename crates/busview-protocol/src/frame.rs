//! Synthesized frames and chart observations

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use crate::error::ParseError;
use crate::kind::NodeKind;
use crate::Protocol;

/// Number of bytes in every synthesized payload
pub const PAYLOAD_LEN: usize = 8;

/// Identifier field used for addressing and priority on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArbitrationId(pub u32);

impl ArbitrationId {
    pub(crate) const fn set(ids: [u32; 4]) -> [ArbitrationId; 4] {
        [Self(ids[0]), Self(ids[1]), Self(ids[2]), Self(ids[3])]
    }

    /// Get the raw identifier value
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Whether the id belongs to the fixed set of the given node kind
    pub fn belongs_to(&self, kind: NodeKind) -> bool {
        kind.arbitration_ids().contains(self)
    }
}

impl fmt::Display for ArbitrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X}", self.0)
    }
}

impl FromStr for ArbitrationId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u32::from_str_radix(digits, 16)
            .map(ArbitrationId)
            .map_err(|_| ParseError::InvalidArbitrationId(trimmed.to_string()))
    }
}

/// Unique identifier of one emitted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

/// Message priority (cosmetic, chosen uniformly)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// All priorities
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Lower-case name used in exports
    pub fn name(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Priority {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Priority::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ParseError::UnknownPriority(needle.to_string()))
    }
}

/// Frame category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameType {
    #[default]
    Data,
    Remote,
    Error,
    Overload,
}

/// Error condition attached to a frame by fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorFlag {
    /// A payload bit was flipped
    BitError,
    /// The frame checksum is invalid
    CrcError,
    /// The sender went bus-off and produced an error frame
    BusOff,
}

impl ErrorFlag {
    /// Flag label as shown in the message list
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorFlag::BitError => "BIT_ERROR",
            ErrorFlag::CrcError => "CRC_ERROR",
            ErrorFlag::BusOff => "BUS_OFF",
        }
    }
}

impl fmt::Display for ErrorFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A synthesized unit of bus traffic
///
/// Messages are immutable once the simulator has emitted them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    /// Unique per emission
    pub id: MessageId,
    /// Creation instant
    pub timestamp: SystemTime,
    /// Arbitration id, drawn from the sender kind's fixed set
    pub arbitration_id: ArbitrationId,
    /// Raw payload bytes
    pub payload: Vec<u8>,
    /// Declared data length code
    pub dlc: u8,
    /// Display name of the sending node
    pub sender: String,
    /// Bus protocol of the sender
    pub protocol: Protocol,
    /// Priority tag
    pub priority: Priority,
    /// Frame category
    pub frame_type: FrameType,
    /// Whether the checksum is valid
    pub crc_valid: bool,
    /// Error conditions injected by active faults
    pub error_flags: Vec<ErrorFlag>,
}

impl Message {
    /// Payload as upper-case hex bytes separated by spaces
    pub fn data_hex(&self) -> String {
        format_hex(&self.payload)
    }

    /// Whether any fault left an error flag on this frame
    pub fn has_errors(&self) -> bool {
        !self.error_flags.is_empty()
    }

    /// Whether this frame carries the given flag
    pub fn has_flag(&self, flag: ErrorFlag) -> bool {
        self.error_flags.contains(&flag)
    }
}

/// One observation of a node signal for charting
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataPoint {
    /// Observation instant
    pub timestamp: SystemTime,
    /// Signal value after the update
    pub value: f64,
    /// Composite key `{node}_{signal}`
    pub parameter: String,
    /// Signal name alone
    pub signal: String,
    /// Engineering unit
    pub unit: String,
}

impl DataPoint {
    /// Build the composite chart key for a node signal
    pub fn parameter_key(node_name: &str, signal: &str) -> String {
        format!("{}_{}", node_name, signal)
    }
}

/// Format bytes as upper-case hex separated by spaces
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Message {
        Message {
            id: MessageId(7),
            timestamp: SystemTime::UNIX_EPOCH,
            arbitration_id: ArbitrationId(0x7E0),
            payload: vec![0x0A, 0xFF, 0x00, 0x10, 0x20, 0x30, 0x40, 0x50],
            dlc: 8,
            sender: "Engine ECU".to_string(),
            protocol: Protocol::Can,
            priority: Priority::High,
            frame_type: FrameType::Data,
            crc_valid: true,
            error_flags: Vec::new(),
        }
    }

    #[test]
    fn test_data_hex_format() {
        let msg = sample_message();
        assert_eq!(msg.data_hex(), "0A FF 00 10 20 30 40 50");
        assert_eq!(msg.id.to_string(), "msg_7");
    }

    #[test]
    fn test_arbitration_id_display_and_parse() {
        assert_eq!(ArbitrationId(0x123).to_string(), "0x123");
        assert_eq!(ArbitrationId(0x7E).to_string(), "0x07E");
        assert_eq!("0x7DF".parse::<ArbitrationId>().unwrap(), ArbitrationId(0x7DF));
        assert_eq!("abc".parse::<ArbitrationId>().unwrap(), ArbitrationId(0xABC));
        assert!("0xZZ".parse::<ArbitrationId>().is_err());
    }

    #[test]
    fn test_arbitration_id_membership() {
        assert!(ArbitrationId(0x7DF).belongs_to(NodeKind::Engine));
        assert!(!ArbitrationId(0x7DF).belongs_to(NodeKind::Brake));
    }

    #[test]
    fn test_error_flags() {
        let mut msg = sample_message();
        assert!(!msg.has_errors());
        msg.error_flags.push(ErrorFlag::BitError);
        assert!(msg.has_errors());
        assert!(msg.has_flag(ErrorFlag::BitError));
        assert!(!msg.has_flag(ErrorFlag::BusOff));
        assert_eq!(ErrorFlag::CrcError.to_string(), "CRC_ERROR");
    }

    #[test]
    fn test_parameter_key() {
        assert_eq!(DataPoint::parameter_key("Engine ECU", "rpm"), "Engine ECU_rpm");
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!(matches!(
            "urgent".parse::<Priority>(),
            Err(ParseError::UnknownPriority(_))
        ));
    }
}
