//! Bus Protocol Vocabulary
//!
//! This crate defines the shared vocabulary of the simulated in-vehicle
//! network used by the rest of the workspace:
//!
//! - **Protocols**: CAN, CAN-FD, LIN and FlexRay, each with its own emission rate
//! - **Node kinds**: the virtual ECU categories and their per-kind signal tables
//! - **Frames**: synthesized [`Message`]s and charting [`DataPoint`]s
//!
//! There is no wire decoding here. Frames are produced by the simulator and
//! consumed by observers and export formatters.
//!
//! # Example
//!
//! ```rust
//! use busview_protocol::{NodeKind, Protocol};
//!
//! let kind: NodeKind = "Engine".parse().unwrap();
//! let rpm = kind.signal("rpm").unwrap();
//! assert_eq!(rpm.midpoint(), 3650.0);
//!
//! assert_eq!(Protocol::CanFd.name(), "CAN-FD");
//! assert!(Protocol::Lin.emission_probability() < Protocol::Can.emission_probability());
//! ```

use std::fmt;
use std::str::FromStr;

pub mod error;
pub mod frame;
pub mod kind;

pub use error::ParseError;
pub use frame::{
    format_hex, ArbitrationId, DataPoint, ErrorFlag, FrameType, Message, MessageId, Priority,
    PAYLOAD_LEN,
};
pub use kind::{NodeKind, SignalSpec};

/// Identifies which bus protocol a virtual node speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Protocol {
    /// Classic CAN (8-byte frames)
    Can,
    /// CAN with flexible data rate (up to 64-byte frames)
    CanFd,
    /// Local Interconnect Network (slow single-wire bus)
    Lin,
    /// FlexRay (time-triggered, high rate)
    FlexRay,
}

impl Protocol {
    /// All supported protocols, in display order
    pub const ALL: [Protocol; 4] = [
        Protocol::Can,
        Protocol::CanFd,
        Protocol::Lin,
        Protocol::FlexRay,
    ];

    /// Returns the conventional name for the protocol
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Can => "CAN",
            Protocol::CanFd => "CAN-FD",
            Protocol::Lin => "LIN",
            Protocol::FlexRay => "FlexRay",
        }
    }

    /// Probability that an active node on this bus emits a frame on a given tick
    pub fn emission_probability(&self) -> f64 {
        match self {
            Protocol::Can => 0.7,
            Protocol::CanFd => 0.8,
            Protocol::Lin => 0.3,
            Protocol::FlexRay => 0.9,
        }
    }

    /// Whether the data length code varies per frame (CAN-FD only)
    pub fn has_variable_dlc(&self) -> bool {
        matches!(self, Protocol::CanFd)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Protocol::ALL
            .into_iter()
            .find(|p| {
                p.name().eq_ignore_ascii_case(needle)
                    || (needle.eq_ignore_ascii_case("canfd") && *p == Protocol::CanFd)
            })
            .ok_or_else(|| ParseError::UnknownProtocol(needle.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_names_round_trip() {
        for protocol in Protocol::ALL {
            assert_eq!(protocol.name().parse::<Protocol>().unwrap(), protocol);
        }
    }

    #[test]
    fn test_protocol_parse_is_case_insensitive() {
        assert_eq!("can-fd".parse::<Protocol>().unwrap(), Protocol::CanFd);
        assert_eq!("CANFD".parse::<Protocol>().unwrap(), Protocol::CanFd);
        assert_eq!(" lin ".parse::<Protocol>().unwrap(), Protocol::Lin);
        assert!(matches!(
            "MOST".parse::<Protocol>(),
            Err(ParseError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn test_emission_probabilities() {
        assert_eq!(Protocol::Can.emission_probability(), 0.7);
        assert_eq!(Protocol::CanFd.emission_probability(), 0.8);
        assert_eq!(Protocol::Lin.emission_probability(), 0.3);
        assert_eq!(Protocol::FlexRay.emission_probability(), 0.9);
        assert!(Protocol::CanFd.has_variable_dlc());
        assert!(!Protocol::Can.has_variable_dlc());
    }
}
