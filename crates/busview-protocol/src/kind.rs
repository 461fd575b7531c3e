//! ECU kinds and their signal tables
//!
//! Each [`NodeKind`] resolves to a fixed table of signals with a declared
//! range, unit and volatility, plus a small set of arbitration ids the kind
//! transmits on. Tables are static and dispatched by exhaustive match.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::frame::ArbitrationId;

/// Declared properties of one signal carried by a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSpec {
    /// Signal name (key into a node's parameter map)
    pub name: &'static str,
    /// Lowest legal value
    pub min: f64,
    /// Highest legal value
    pub max: f64,
    /// Engineering unit
    pub unit: &'static str,
    /// Largest per-update change, as a fraction of the range
    pub volatility: f64,
}

impl SignalSpec {
    const fn new(
        name: &'static str,
        min: f64,
        max: f64,
        unit: &'static str,
        volatility: f64,
    ) -> Self {
        Self {
            name,
            min,
            max,
            unit,
            volatility,
        }
    }

    /// Width of the declared range
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Center of the declared range
    pub fn midpoint(&self) -> f64 {
        self.min + self.span() * 0.5
    }

    /// Clamp a value into the declared range (NaN maps to `min`)
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    /// Largest absolute perturbation applied in one update
    pub fn max_delta(&self) -> f64 {
        self.volatility * self.span()
    }

    /// Scale a value onto the full `u16` range for the frame payload
    pub fn scale_to_u16(&self, value: f64) -> u16 {
        let ratio = (self.clamp(value) - self.min) / self.span();
        (ratio * f64::from(u16::MAX)).round() as u16
    }
}

const ENGINE_SIGNALS: &[SignalSpec] = &[
    SignalSpec::new("rpm", 800.0, 6500.0, "rpm", 0.1),
    SignalSpec::new("coolantTemp", 80.0, 110.0, "°C", 0.02),
    SignalSpec::new("oilPressure", 2.0, 6.0, "bar", 0.05),
    SignalSpec::new("throttlePosition", 0.0, 100.0, "%", 0.3),
    SignalSpec::new("fuelLevel", 0.0, 100.0, "%", 0.001),
    SignalSpec::new("manifoldPressure", 0.3, 2.5, "bar", 0.15),
];

const BRAKE_SIGNALS: &[SignalSpec] = &[
    SignalSpec::new("brakePressure", 0.0, 180.0, "bar", 0.2),
    SignalSpec::new("wheelSpeed_FL", 0.0, 250.0, "km/h", 0.05),
    SignalSpec::new("wheelSpeed_FR", 0.0, 250.0, "km/h", 0.05),
    SignalSpec::new("wheelSpeed_RL", 0.0, 250.0, "km/h", 0.05),
    SignalSpec::new("wheelSpeed_RR", 0.0, 250.0, "km/h", 0.05),
    SignalSpec::new("absActive", 0.0, 1.0, "bool", 0.1),
];

const SENSOR_SIGNALS: &[SignalSpec] = &[
    SignalSpec::new("ambientTemp", -40.0, 60.0, "°C", 0.01),
    SignalSpec::new("humidity", 0.0, 100.0, "%", 0.02),
    SignalSpec::new("batteryVoltage", 11.5, 14.8, "V", 0.01),
    SignalSpec::new("fuelPressure", 3.0, 5.5, "bar", 0.03),
    SignalSpec::new("airflow", 0.0, 500.0, "kg/h", 0.1),
];

const GATEWAY_SIGNALS: &[SignalSpec] = &[
    SignalSpec::new("busLoad", 0.0, 100.0, "%", 0.05),
    SignalSpec::new("errorCount", 0.0, 255.0, "count", 0.02),
    SignalSpec::new("messageRate", 0.0, 1000.0, "msg/s", 0.1),
];

const BODY_CONTROL_SIGNALS: &[SignalSpec] = &[
    SignalSpec::new("leftTurnSignal", 0.0, 1.0, "bool", 0.1),
    SignalSpec::new("rightTurnSignal", 0.0, 1.0, "bool", 0.1),
    SignalSpec::new("headlights", 0.0, 1.0, "bool", 0.05),
    SignalSpec::new("doorStatus", 0.0, 15.0, "bitmap", 0.02),
    SignalSpec::new("windowPosition", 0.0, 100.0, "%", 0.03),
];

const TRANSMISSION_SIGNALS: &[SignalSpec] = &[
    SignalSpec::new("gearPosition", 0.0, 8.0, "gear", 0.05),
    SignalSpec::new("clutchPosition", 0.0, 100.0, "%", 0.1),
    SignalSpec::new("transmissionTemp", 60.0, 120.0, "°C", 0.02),
    SignalSpec::new("torqueRequest", 0.0, 500.0, "Nm", 0.15),
];

/// Category of a virtual ECU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// Engine control unit
    Engine,
    /// Anti-lock brake system
    Brake,
    /// Standalone sensor cluster
    Sensor,
    /// Central gateway
    Gateway,
    /// Body control module
    BodyControl,
    /// Transmission control unit
    Transmission,
    /// User-defined node (uses the sensor signal table)
    Custom,
}

impl NodeKind {
    /// All node kinds, in display order
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Engine,
        NodeKind::Brake,
        NodeKind::Sensor,
        NodeKind::Gateway,
        NodeKind::BodyControl,
        NodeKind::Transmission,
        NodeKind::Custom,
    ];

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Engine => "Engine",
            NodeKind::Brake => "Brake",
            NodeKind::Sensor => "Sensor",
            NodeKind::Gateway => "Gateway",
            NodeKind::BodyControl => "BodyControl",
            NodeKind::Transmission => "Transmission",
            NodeKind::Custom => "Custom",
        }
    }

    /// Signals this kind of node carries
    pub fn signals(&self) -> &'static [SignalSpec] {
        match self {
            NodeKind::Engine => ENGINE_SIGNALS,
            NodeKind::Brake => BRAKE_SIGNALS,
            NodeKind::Sensor | NodeKind::Custom => SENSOR_SIGNALS,
            NodeKind::Gateway => GATEWAY_SIGNALS,
            NodeKind::BodyControl => BODY_CONTROL_SIGNALS,
            NodeKind::Transmission => TRANSMISSION_SIGNALS,
        }
    }

    /// Look up a signal by name
    pub fn signal(&self, name: &str) -> Option<&'static SignalSpec> {
        self.signals().iter().find(|s| s.name == name)
    }

    /// Arbitration ids frames from this kind are sent on
    pub fn arbitration_ids(&self) -> &'static [ArbitrationId; 4] {
        const ENGINE: [ArbitrationId; 4] = ArbitrationId::set([0x7E0, 0x7E8, 0x7DF, 0x123]);
        const BRAKE: [ArbitrationId; 4] = ArbitrationId::set([0x1A0, 0x1A1, 0x1A2, 0x456]);
        const SENSOR: [ArbitrationId; 4] = ArbitrationId::set([0x3C0, 0x3C1, 0x3C2, 0x789]);
        const GATEWAY: [ArbitrationId; 4] = ArbitrationId::set([0x7FF, 0x7FE, 0x7FD, 0xABC]);
        const BODY: [ArbitrationId; 4] = ArbitrationId::set([0x2A0, 0x2A1, 0x2A2, 0xDEF]);
        const TRANSMISSION: [ArbitrationId; 4] = ArbitrationId::set([0x1C0, 0x1C1, 0x1C2, 0x321]);
        const CUSTOM: [ArbitrationId; 4] = ArbitrationId::set([0xAAA, 0xBBB, 0xCCC, 0xDDD]);

        match self {
            NodeKind::Engine => &ENGINE,
            NodeKind::Brake => &BRAKE,
            NodeKind::Sensor => &SENSOR,
            NodeKind::Gateway => &GATEWAY,
            NodeKind::BodyControl => &BODY,
            NodeKind::Transmission => &TRANSMISSION,
            NodeKind::Custom => &CUSTOM,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NodeKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        // Common abbreviations
        if needle.eq_ignore_ascii_case("bcm") {
            return Ok(NodeKind::BodyControl);
        }
        if needle.eq_ignore_ascii_case("tcu") {
            return Ok(NodeKind::Transmission);
        }
        NodeKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ParseError::UnknownNodeKind(needle.to_string()))
    }
}
