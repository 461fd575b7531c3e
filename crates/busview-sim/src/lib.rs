//! In-Vehicle Network Traffic Simulation
//!
//! This crate synthesizes plausible bus traffic for a set of virtual ECUs
//! without any bus hardware. It includes:
//!
//! - **NodeRegistry**: virtual ECUs with per-kind signal maps
//! - **FaultTable**: named fault conditions matched to nodes by display name
//! - **HistoryBuffer**: bounded FIFO histories for messages and data points
//! - **Synthesizer**: the session context and its start/stop/tick state machine
//! - **Session task**: an async task driving a synthesizer on a timer
//!
//! # Example
//!
//! ```rust
//! use busview_protocol::{NodeKind, Protocol};
//! use busview_sim::{SimulationConfig, Synthesizer};
//!
//! let mut sim = Synthesizer::new(SimulationConfig {
//!     seed: Some(7),
//!     seed_default_nodes: false,
//!     ..Default::default()
//! });
//! sim.add_node("Engine ECU", NodeKind::Engine, Protocol::Can).unwrap();
//!
//! sim.start();
//! for _ in 0..100 {
//!     sim.tick();
//! }
//! assert!(sim.messages().len() <= 200);
//! assert!(sim.gauges().bus_load <= 100.0);
//! ```

pub mod config;
pub mod error;
pub mod fault;
pub mod history;
pub mod node;
pub mod session;
pub mod synth;

pub use config::{SimulationConfig, TimingMode, MAX_PERIOD_MS};
pub use error::SimError;
pub use fault::{Fault, FaultId, FaultTable, FaultType, Severity};
pub use history::{HistoryBuffer, DATA_POINT_HISTORY, MESSAGE_HISTORY};
pub use node::{Node, NodeId, NodeRegistry, NodeStatus};
pub use session::{run_session_task, spawn_session, SessionCommand, SessionEvent, SessionHandle};
pub use synth::{Gauges, SimSnapshot, Synthesizer, TickReport};
