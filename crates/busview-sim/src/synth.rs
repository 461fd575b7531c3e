//! Traffic synthesizer
//!
//! The [`Synthesizer`] is the whole state of one simulation session: node
//! registry, fault table, bounded histories, derived gauges and the random
//! source. It is a two-state machine (stopped/running); each [`tick`] walks
//! the active nodes, probabilistically emits one frame per node, applies any
//! matching active faults and records the results.
//!
//! The synthesizer does no scheduling itself. The session task (or a test)
//! calls [`tick`] at the period returned from [`start`].
//!
//! [`tick`]: Synthesizer::tick
//! [`start`]: Synthesizer::start

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use busview_protocol::{
    ArbitrationId, DataPoint, ErrorFlag, FrameType, Message, MessageId, NodeKind, Priority,
    Protocol, PAYLOAD_LEN,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{SimulationConfig, TimingMode};
use crate::error::SimError;
use crate::fault::{Fault, FaultId, FaultTable, FaultType, Severity};
use crate::history::HistoryBuffer;
use crate::node::{Node, NodeId, NodeRegistry, NodeStatus};

/// Derived bus statistics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gauges {
    /// Estimated channel saturation, 0-100
    pub bus_load: f64,
    /// Share of the last tick's frames that carried error flags, 0-100
    pub error_rate: f64,
}

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TickReport {
    /// Frames emitted this tick
    pub emitted: usize,
    /// Frames emitted this tick with at least one error flag
    pub flagged: usize,
    /// Gauges after the tick
    pub gauges: Gauges,
}

/// Point-in-time copy of the session state for observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub nodes: Vec<Node>,
    pub faults: Vec<Fault>,
    pub messages: Vec<Message>,
    pub data_points: Vec<DataPoint>,
    pub gauges: Gauges,
    pub is_running: bool,
    /// Frames emitted since the last start or clear
    pub emitted_since_start: u64,
}

/// Run state of the synthesizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Stopped,
    Running { period: Duration },
}

/// The session context: registries, histories, gauges and RNG
pub struct Synthesizer {
    config: SimulationConfig,
    nodes: NodeRegistry,
    faults: FaultTable,
    messages: HistoryBuffer<Message>,
    data_points: HistoryBuffer<DataPoint>,
    gauges: Gauges,
    emitted_since_start: u64,
    next_message_id: u64,
    state: RunState,
    rng: StdRng,
}

impl Synthesizer {
    /// Create a stopped synthesizer
    ///
    /// Uses `config.seed` when present, OS entropy otherwise.
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    /// Create a stopped synthesizer with an explicit random source
    pub fn with_rng(config: SimulationConfig, rng: StdRng) -> Self {
        let mut nodes = NodeRegistry::new();
        if config.seed_default_nodes {
            nodes.seed_defaults();
        }

        Self {
            messages: HistoryBuffer::new(config.message_capacity),
            data_points: HistoryBuffer::new(config.data_point_capacity),
            config,
            nodes,
            faults: FaultTable::new(),
            gauges: Gauges::default(),
            emitted_since_start: 0,
            next_message_id: 1,
            state: RunState::Stopped,
            rng,
        }
    }

    /// Session configuration
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Run state
    // ------------------------------------------------------------------

    /// Transition to running
    ///
    /// Returns the chosen tick period, or `None` if already running.
    /// Resets the emitted-frame counter that drives bus load.
    pub fn start(&mut self) -> Option<Duration> {
        if self.is_running() {
            return None;
        }
        self.emitted_since_start = 0;
        let period = self.roll_period();
        self.state = RunState::Running { period };
        info!("Simulation started with {}ms tick period", period.as_millis());
        Some(period)
    }

    /// Transition to stopped, zeroing the gauges
    ///
    /// Returns `false` if already stopped. Nodes, faults and histories are
    /// left untouched.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.state = RunState::Stopped;
        self.gauges = Gauges::default();
        info!("Simulation stopped after {} frames", self.emitted_since_start);
        true
    }

    /// Whether ticks currently have an effect
    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running { .. })
    }

    /// Current tick period, if running
    pub fn period(&self) -> Option<Duration> {
        match self.state {
            RunState::Running { period } => Some(period),
            RunState::Stopped => None,
        }
    }

    /// Period to wait before the next tick
    ///
    /// In [`TimingMode::JitterPerTick`] a fresh period is drawn on every call.
    pub fn next_period(&mut self) -> Option<Duration> {
        match (self.state, self.config.timing) {
            (RunState::Stopped, _) => None,
            (RunState::Running { period }, TimingMode::FixedAtStart) => Some(period),
            (RunState::Running { .. }, TimingMode::JitterPerTick) => {
                let period = self.roll_period();
                self.state = RunState::Running { period };
                Some(period)
            }
        }
    }

    fn roll_period(&mut self) -> Duration {
        let (min, max) = self.config.period_range_ms();
        Duration::from_millis(self.rng.gen_range(min..max))
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Run one synthesis pass over the active nodes
    ///
    /// A tick while stopped does nothing.
    pub fn tick(&mut self) -> TickReport {
        if !self.is_running() {
            return TickReport {
                gauges: self.gauges,
                ..Default::default()
            };
        }

        let now = SystemTime::now();
        let mut emitted = 0usize;
        let mut flagged = 0usize;

        for node in self.nodes.iter_mut().filter(|n| n.is_active()) {
            if self.rng.gen::<f64>() >= node.protocol.emission_probability() {
                continue;
            }

            let id = MessageId(self.next_message_id);
            self.next_message_id += 1;

            let (message, point) = synthesize(node, &self.faults, &mut self.rng, id, now);
            if message.has_errors() {
                flagged += 1;
                debug!(
                    "{} from {} flagged {:?}",
                    message.id, message.sender, message.error_flags
                );
            }
            emitted += 1;

            self.messages.push(message);
            self.data_points.push(point);
        }

        self.emitted_since_start += emitted as u64;
        self.gauges = Gauges {
            bus_load: bus_load(self.emitted_since_start),
            error_rate: error_rate(flagged, emitted),
        };

        debug!(
            "Tick: {} emitted, {} flagged, load {:.1}%, errors {:.1}%",
            emitted, flagged, self.gauges.bus_load, self.gauges.error_rate
        );

        TickReport {
            emitted,
            flagged,
            gauges: self.gauges,
        }
    }

    /// Empty both histories and zero the counter and gauges
    ///
    /// Does not change the run state.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.data_points.clear();
        self.emitted_since_start = 0;
        self.gauges = Gauges::default();
        info!("Cleared message and data point history");
    }

    // ------------------------------------------------------------------
    // Registry operations
    // ------------------------------------------------------------------

    /// Add a node (see [`NodeRegistry::add_node`])
    pub fn add_node(
        &mut self,
        name: &str,
        kind: NodeKind,
        protocol: Protocol,
    ) -> Result<&Node, SimError> {
        self.nodes.add_node(name, kind, protocol)
    }

    /// Change a node's status, returning whether it changed
    pub fn set_status(&mut self, id: NodeId, status: NodeStatus) -> Result<bool, SimError> {
        self.nodes.set_status(id, status)
    }

    /// Set a node signal, clamped to its range
    pub fn set_parameter(&mut self, id: NodeId, signal: &str, value: f64) -> Result<f64, SimError> {
        self.nodes.set_parameter(id, signal, value)
    }

    /// Add an inactive fault
    pub fn add_fault(
        &mut self,
        fault_type: FaultType,
        target: &str,
        severity: Severity,
        description: &str,
    ) -> Result<&Fault, SimError> {
        self.faults
            .add_fault(fault_type, target, severity, description)
    }

    /// Flip a fault's active flag
    pub fn toggle_fault(&mut self, id: FaultId) -> Result<bool, SimError> {
        self.faults.toggle_fault(id)
    }

    /// Delete a fault
    pub fn remove_fault(&mut self, id: FaultId) -> Result<Fault, SimError> {
        self.faults.remove_fault(id)
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Node registry
    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    /// Fault table
    pub fn faults(&self) -> &FaultTable {
        &self.faults
    }

    /// Message history
    pub fn messages(&self) -> &HistoryBuffer<Message> {
        &self.messages
    }

    /// Data point history
    pub fn data_points(&self) -> &HistoryBuffer<DataPoint> {
        &self.data_points
    }

    /// Current gauges
    pub fn gauges(&self) -> Gauges {
        self.gauges
    }

    /// Frames emitted since the last start or clear
    pub fn emitted_since_start(&self) -> u64 {
        self.emitted_since_start
    }

    /// Recorded points for one `{node}_{signal}` key, oldest first
    pub fn series(&self, parameter: &str) -> Vec<DataPoint> {
        self.data_points
            .iter()
            .filter(|p| p.parameter == parameter)
            .cloned()
            .collect()
    }

    /// Newest recorded point of every parameter, ordered by key
    pub fn latest_values(&self) -> Vec<DataPoint> {
        let mut latest: BTreeMap<&str, &DataPoint> = BTreeMap::new();
        for point in self.data_points.iter() {
            latest.insert(&point.parameter, point);
        }
        latest.into_values().cloned().collect()
    }

    /// Copy the whole state for an observer
    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            nodes: self.nodes.to_vec(),
            faults: self.faults.to_vec(),
            messages: self.messages.to_vec(),
            data_points: self.data_points.to_vec(),
            gauges: self.gauges,
            is_running: self.is_running(),
            emitted_since_start: self.emitted_since_start,
        }
    }
}

/// Bus load as a saturating function of frames since start
fn bus_load(emitted_since_start: u64) -> f64 {
    (emitted_since_start as f64 / 10.0 * 2.0).min(100.0)
}

/// Percentage of this tick's frames carrying error flags
fn error_rate(flagged: usize, emitted: usize) -> f64 {
    if emitted == 0 {
        return 0.0;
    }
    flagged as f64 / emitted as f64 * 100.0
}

/// Build one frame for `node`, updating the chosen signal in place
fn synthesize(
    node: &mut Node,
    faults: &FaultTable,
    rng: &mut StdRng,
    id: MessageId,
    now: SystemTime,
) -> (Message, DataPoint) {
    let signals = node.kind.signals();
    let spec = &signals[rng.gen_range(0..signals.len())];

    let current = node.parameter(spec.name).unwrap_or(spec.min);
    let delta = (rng.gen::<f64>() - 0.5) * 2.0 * spec.max_delta();
    let value = spec.clamp(current + delta);
    node.set_parameter(spec.name, value);

    let scaled = spec.scale_to_u16(value);
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[..2].copy_from_slice(&scaled.to_be_bytes());
    rng.fill(&mut payload[2..]);

    let ids = node.kind.arbitration_ids();
    let arbitration_id: ArbitrationId = ids[rng.gen_range(0..ids.len())];
    let dlc = if node.protocol.has_variable_dlc() {
        rng.gen_range(1..=64)
    } else {
        PAYLOAD_LEN as u8
    };
    let priority = Priority::ALL[rng.gen_range(0..Priority::ALL.len())];

    let mut frame_type = FrameType::Data;
    let mut crc_valid = true;
    let mut error_flags = Vec::new();

    for fault in faults.active_for(&node.name) {
        let Some((probability, flag)) = fault.fault_type.effect() else {
            continue;
        };
        if rng.gen::<f64>() >= probability {
            continue;
        }
        match flag {
            ErrorFlag::BitError => {
                let byte = rng.gen_range(0..PAYLOAD_LEN);
                payload[byte] ^= 1u8 << rng.gen_range(0..8u32);
            }
            ErrorFlag::CrcError => crc_valid = false,
            ErrorFlag::BusOff => frame_type = FrameType::Error,
        }
        error_flags.push(flag);
    }

    let message = Message {
        id,
        timestamp: now,
        arbitration_id,
        payload: payload.to_vec(),
        dlc,
        sender: node.name.clone(),
        protocol: node.protocol,
        priority,
        frame_type,
        crc_valid,
        error_flags,
    };

    let point = DataPoint {
        timestamp: now,
        value,
        parameter: DataPoint::parameter_key(&node.name, spec.name),
        signal: spec.name.to_string(),
        unit: spec.unit.to_string(),
    };

    (message, point)
}
