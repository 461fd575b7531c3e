//! Simulation session task
//!
//! This module provides an async task that owns a [`Synthesizer`] and drives
//! it on a timer. The task uses a `select!` loop to:
//! - Handle control commands from an mpsc channel
//! - Tick the synthesizer while it is running
//! - Emit session events via a broadcast channel
//!
//! Commands are handled before the next tick is awaited, so a `Stop` always
//! takes effect before another tick can fire.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), busview_sim::SimError> {
//! use busview_sim::{spawn_session, SimulationConfig, Synthesizer};
//!
//! let (session, mut events, _task) = spawn_session(Synthesizer::new(SimulationConfig::default()));
//! session.start().await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use busview_protocol::{DataPoint, NodeKind, Protocol};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::SimError;
use crate::fault::{Fault, FaultId, FaultType, Severity};
use crate::node::{Node, NodeId, NodeStatus};
use crate::synth::{SimSnapshot, Synthesizer, TickReport};
use crate::TimingMode;

/// Capacity of the command channel
const COMMAND_BUFFER: usize = 64;

/// Capacity of the event broadcast channel
const EVENT_BUFFER: usize = 256;

/// Commands accepted by the session task
#[derive(Debug)]
pub enum SessionCommand {
    /// Begin ticking (no-op while running)
    Start,
    /// Stop ticking (no-op while stopped)
    Stop,
    /// Add a node
    AddNode {
        name: String,
        kind: NodeKind,
        protocol: Protocol,
        response: oneshot::Sender<Result<Node, SimError>>,
    },
    /// Change a node's status
    SetStatus {
        id: NodeId,
        status: NodeStatus,
        response: oneshot::Sender<Result<bool, SimError>>,
    },
    /// Set one node signal
    SetParameter {
        id: NodeId,
        signal: String,
        value: f64,
        response: oneshot::Sender<Result<f64, SimError>>,
    },
    /// Add an inactive fault
    AddFault {
        fault_type: FaultType,
        target: String,
        severity: Severity,
        description: String,
        response: oneshot::Sender<Result<Fault, SimError>>,
    },
    /// Flip a fault's active flag
    ToggleFault {
        id: FaultId,
        response: oneshot::Sender<Result<bool, SimError>>,
    },
    /// Delete a fault
    RemoveFault {
        id: FaultId,
        response: oneshot::Sender<Result<Fault, SimError>>,
    },
    /// Empty histories and zero gauges
    Clear,
    /// Copy the session state
    Snapshot {
        response: oneshot::Sender<SimSnapshot>,
    },
    /// Recorded points for one parameter key
    Series {
        parameter: String,
        response: oneshot::Sender<Vec<DataPoint>>,
    },
    /// Newest point of every parameter
    LatestValues {
        response: oneshot::Sender<Vec<DataPoint>>,
    },
    /// End the task
    Shutdown,
}

/// Events emitted by the session task
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Ticking began with the given period
    Started { period: Duration },
    /// Ticking stopped
    Stopped,
    /// One tick completed
    Tick(TickReport),
    /// Histories were cleared
    Cleared,
    /// A node was added
    NodeAdded { id: NodeId, name: String },
    /// A node's status changed
    NodeStatusChanged { id: NodeId, status: NodeStatus },
    /// A fault was added
    FaultAdded { id: FaultId },
    /// A fault was toggled
    FaultToggled { id: FaultId, active: bool },
    /// A fault was removed
    FaultRemoved { id: FaultId },
    /// A command was rejected
    Error {
        /// Command that failed
        source: String,
        /// Error message
        message: String,
    },
}

/// Run the session task until `Shutdown` or until every handle is dropped
pub async fn run_session_task(
    mut sim: Synthesizer,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
) {
    info!("Simulation session task started");

    let mut ticker = idle_ticker(&sim);

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("Session command channel closed");
                    break;
                };
                match cmd {
                    SessionCommand::Start => {
                        if let Some(period) = sim.start() {
                            ticker = interval_at(Instant::now() + period, period);
                            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            let _ = event_tx.send(SessionEvent::Started { period });
                        }
                    }

                    SessionCommand::Stop => {
                        if sim.stop() {
                            let _ = event_tx.send(SessionEvent::Stopped);
                        }
                    }

                    SessionCommand::AddNode { name, kind, protocol, response } => {
                        let result = sim.add_node(&name, kind, protocol).cloned();
                        match &result {
                            Ok(node) => {
                                let _ = event_tx.send(SessionEvent::NodeAdded {
                                    id: node.id,
                                    name: node.name.clone(),
                                });
                            }
                            Err(e) => report_error(&event_tx, "add node", e),
                        }
                        let _ = response.send(result);
                    }

                    SessionCommand::SetStatus { id, status, response } => {
                        let result = sim.set_status(id, status);
                        match &result {
                            Ok(true) => {
                                let event = SessionEvent::NodeStatusChanged { id, status };
                                let _ = event_tx.send(event);
                            }
                            Ok(false) => {}
                            Err(e) => report_error(&event_tx, "set status", e),
                        }
                        let _ = response.send(result);
                    }

                    SessionCommand::SetParameter { id, signal, value, response } => {
                        let result = sim.set_parameter(id, &signal, value);
                        if let Err(e) = &result {
                            report_error(&event_tx, "set parameter", e);
                        }
                        let _ = response.send(result);
                    }

                    SessionCommand::AddFault {
                        fault_type,
                        target,
                        severity,
                        description,
                        response,
                    } => {
                        let result = sim
                            .add_fault(fault_type, &target, severity, &description)
                            .cloned();
                        match &result {
                            Ok(fault) => {
                                let _ = event_tx.send(SessionEvent::FaultAdded { id: fault.id });
                            }
                            Err(e) => report_error(&event_tx, "add fault", e),
                        }
                        let _ = response.send(result);
                    }

                    SessionCommand::ToggleFault { id, response } => {
                        let result = sim.toggle_fault(id);
                        match &result {
                            Ok(active) => {
                                let event = SessionEvent::FaultToggled { id, active: *active };
                                let _ = event_tx.send(event);
                            }
                            Err(e) => report_error(&event_tx, "toggle fault", e),
                        }
                        let _ = response.send(result);
                    }

                    SessionCommand::RemoveFault { id, response } => {
                        let result = sim.remove_fault(id);
                        match &result {
                            Ok(_) => {
                                let _ = event_tx.send(SessionEvent::FaultRemoved { id });
                            }
                            Err(e) => report_error(&event_tx, "remove fault", e),
                        }
                        let _ = response.send(result);
                    }

                    SessionCommand::Clear => {
                        sim.clear();
                        let _ = event_tx.send(SessionEvent::Cleared);
                    }

                    SessionCommand::Snapshot { response } => {
                        let _ = response.send(sim.snapshot());
                    }

                    SessionCommand::Series { parameter, response } => {
                        let _ = response.send(sim.series(&parameter));
                    }

                    SessionCommand::LatestValues { response } => {
                        let _ = response.send(sim.latest_values());
                    }

                    SessionCommand::Shutdown => {
                        info!("Shutdown requested for simulation session");
                        break;
                    }
                }
            }

            _ = ticker.tick(), if sim.is_running() => {
                let report = sim.tick();
                if sim.config().timing == TimingMode::JitterPerTick {
                    if let Some(next) = sim.next_period() {
                        ticker.reset_after(next);
                    }
                }
                let _ = event_tx.send(SessionEvent::Tick(report));
            }
        }
    }

    sim.stop();
    info!("Simulation session task ended");
}

/// Placeholder timer used until the first start
fn idle_ticker(sim: &Synthesizer) -> Interval {
    interval(sim.config().min_period())
}

fn report_error(event_tx: &broadcast::Sender<SessionEvent>, source: &str, error: &SimError) {
    warn!("Rejected {}: {}", source, error);
    let _ = event_tx.send(SessionEvent::Error {
        source: source.to_string(),
        message: error.to_string(),
    });
}

/// Spawn a session task on the current runtime
///
/// Returns the control handle, an event receiver and the task handle.
pub fn spawn_session(
    sim: Synthesizer,
) -> (SessionHandle, broadcast::Receiver<SessionEvent>, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = broadcast::channel(EVENT_BUFFER);
    let handle = SessionHandle {
        cmd_tx,
        event_tx: event_tx.clone(),
    };
    let task = tokio::spawn(run_session_task(sim, cmd_rx, event_tx));
    (handle, event_rx, task)
}

/// Cloneable control handle for a running session task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SimError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SimError::SessionClosed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SimError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| SimError::SessionClosed)
    }

    /// Begin ticking
    pub async fn start(&self) -> Result<(), SimError> {
        self.send(SessionCommand::Start).await
    }

    /// Stop ticking
    pub async fn stop(&self) -> Result<(), SimError> {
        self.send(SessionCommand::Stop).await
    }

    /// Empty histories and zero gauges
    pub async fn clear(&self) -> Result<(), SimError> {
        self.send(SessionCommand::Clear).await
    }

    /// End the session task
    pub async fn shutdown(&self) -> Result<(), SimError> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Add a node
    pub async fn add_node(
        &self,
        name: impl Into<String>,
        kind: NodeKind,
        protocol: Protocol,
    ) -> Result<Node, SimError> {
        let name = name.into();
        self.request(|response| SessionCommand::AddNode {
            name,
            kind,
            protocol,
            response,
        })
        .await?
    }

    /// Change a node's status, returning whether it changed
    pub async fn set_status(&self, id: NodeId, status: NodeStatus) -> Result<bool, SimError> {
        self.request(|response| SessionCommand::SetStatus {
            id,
            status,
            response,
        })
        .await?
    }

    /// Set one node signal, returning the clamped value stored
    pub async fn set_parameter(
        &self,
        id: NodeId,
        signal: impl Into<String>,
        value: f64,
    ) -> Result<f64, SimError> {
        let signal = signal.into();
        self.request(|response| SessionCommand::SetParameter {
            id,
            signal,
            value,
            response,
        })
        .await?
    }

    /// Add an inactive fault
    pub async fn add_fault(
        &self,
        fault_type: FaultType,
        target: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Result<Fault, SimError> {
        let target = target.into();
        let description = description.into();
        self.request(|response| SessionCommand::AddFault {
            fault_type,
            target,
            severity,
            description,
            response,
        })
        .await?
    }

    /// Flip a fault's active flag, returning the new state
    pub async fn toggle_fault(&self, id: FaultId) -> Result<bool, SimError> {
        self.request(|response| SessionCommand::ToggleFault { id, response })
            .await?
    }

    /// Delete a fault
    pub async fn remove_fault(&self, id: FaultId) -> Result<Fault, SimError> {
        self.request(|response| SessionCommand::RemoveFault { id, response })
            .await?
    }

    /// Copy the session state
    pub async fn snapshot(&self) -> Result<SimSnapshot, SimError> {
        self.request(|response| SessionCommand::Snapshot { response })
            .await
    }

    /// Recorded points for one `{node}_{signal}` key, oldest first
    pub async fn series(&self, parameter: impl Into<String>) -> Result<Vec<DataPoint>, SimError> {
        let parameter = parameter.into();
        self.request(|response| SessionCommand::Series {
            parameter,
            response,
        })
        .await
    }

    /// Newest point of every parameter, ordered by key
    pub async fn latest_values(&self) -> Result<Vec<DataPoint>, SimError> {
        self.request(|response| SessionCommand::LatestValues { response })
            .await
    }
}
