//! Interactive line console driving a live session
//!
//! Each input line is parsed into a [`ConsoleCommand`] and executed against
//! the session through its [`SessionHandle`]. Output goes to stdout, errors to
//! stderr, and session lifecycle events are echoed by a background task.

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use busview_protocol::{NodeKind, ParseError, Protocol};
use busview_sim::{FaultId, FaultType, NodeId, NodeStatus, SessionEvent, SessionHandle, Severity};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::debug;

use crate::settings::Settings;
use crate::traffic_view::{iso_timestamp, ExportFormat, TrafficFilter, TrafficView};

const HELP: &str = "\
commands:
  start                                         begin synthesizing traffic
  stop                                          pause the session
  nodes                                         list nodes and their signals
  add-node <kind> <protocol> <name...>          add an active node
  status <node-id> <status>                     set active|inactive|error|bus-off
  set <node-id> <signal> <value>                set a signal (clamped to range)
  faults                                        list faults
  add-fault <type> <target> <severity> <desc...> add an inactive fault
  toggle <fault-id>                             activate or deactivate a fault
  remove-fault <fault-id>                       delete a fault
  clear                                         empty message and data history
  stats                                         show gauges and counters
  messages [proto=P] [prio=P] [errors] [text] [sender=NAME...]
                                                list recent messages
  signals [<node>_<signal>]                     latest signal values, or one signal's history
  export <log|asc|csv> [path]                   write the message history
  help                                          show this text
  quit                                          leave the console

fault targets with spaces can be quoted (\"Engine ECU\") or given as a node id (ecu_1)";

/// Errors while parsing a console line
#[derive(Debug, Error, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command: {0} (try `help`)")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("unknown export format: {0}")]
    UnknownFormat(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// One parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Nodes,
    AddNode {
        kind: NodeKind,
        protocol: Protocol,
        name: String,
    },
    Status {
        id: NodeId,
        status: NodeStatus,
    },
    Set {
        id: NodeId,
        signal: String,
        value: f64,
    },
    Faults,
    AddFault {
        fault_type: FaultType,
        target: String,
        severity: Severity,
        description: String,
    },
    Toggle(FaultId),
    RemoveFault(FaultId),
    Clear,
    Stats,
    Messages(TrafficFilter),
    /// Latest value per parameter, or the history of one `{node}_{signal}` key
    Signals(Option<String>),
    Export {
        format: ExportFormat,
        path: Option<PathBuf>,
    },
    Help,
    Quit,
}

/// Split off up to `n` leading words, returning them and the trimmed remainder
///
/// A word starting with `"` extends to the next `"`.
fn take_words(mut input: &str, n: usize) -> (Vec<&str>, &str) {
    let mut words = Vec::with_capacity(n);
    for _ in 0..n {
        input = input.trim_start();
        if input.is_empty() {
            break;
        }
        if let Some(quoted) = input.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            words.push(&quoted[..end]);
            input = quoted.get(end + 1..).unwrap_or("");
        } else {
            let end = input.find(char::is_whitespace).unwrap_or(input.len());
            words.push(&input[..end]);
            input = &input[end..];
        }
    }
    (words, input.trim())
}

fn node_id(s: &str) -> Result<NodeId, ConsoleError> {
    s.parse().map_err(|_| ConsoleError::InvalidId(s.to_string()))
}

fn fault_id(s: &str) -> Result<FaultId, ConsoleError> {
    s.parse().map_err(|_| ConsoleError::InvalidId(s.to_string()))
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (head, rest) = take_words(line, 1);
        let Some(word) = head.first() else {
            return Err(ConsoleError::UnknownCommand(String::new()));
        };

        match word.to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "nodes" => Ok(Self::Nodes),
            "add-node" => {
                const USAGE: &str = "add-node <kind> <protocol> <name...>";
                let (words, name) = take_words(rest, 2);
                if words.len() < 2 || name.is_empty() {
                    return Err(ConsoleError::Usage(USAGE));
                }
                Ok(Self::AddNode {
                    kind: words[0].parse()?,
                    protocol: words[1].parse()?,
                    name: name.to_string(),
                })
            }
            "status" => {
                let (words, _) = take_words(rest, 2);
                if words.len() < 2 {
                    return Err(ConsoleError::Usage("status <node-id> <status>"));
                }
                Ok(Self::Status {
                    id: node_id(words[0])?,
                    status: words[1].parse()?,
                })
            }
            "set" => {
                let (words, _) = take_words(rest, 3);
                if words.len() < 3 {
                    return Err(ConsoleError::Usage("set <node-id> <signal> <value>"));
                }
                let value = words[2]
                    .parse()
                    .map_err(|_| ConsoleError::InvalidValue(words[2].to_string()))?;
                Ok(Self::Set {
                    id: node_id(words[0])?,
                    signal: words[1].to_string(),
                    value,
                })
            }
            "faults" => Ok(Self::Faults),
            "add-fault" => {
                const USAGE: &str = "add-fault <type> <target> <severity> <description...>";
                let (words, description) = take_words(rest, 3);
                if words.len() < 3 || description.is_empty() {
                    return Err(ConsoleError::Usage(USAGE));
                }
                Ok(Self::AddFault {
                    fault_type: words[0].parse()?,
                    target: words[1].to_string(),
                    severity: words[2].parse()?,
                    description: description.to_string(),
                })
            }
            "toggle" => {
                let (words, _) = take_words(rest, 1);
                let id = words.first().ok_or(ConsoleError::Usage("toggle <fault-id>"))?;
                Ok(Self::Toggle(fault_id(id)?))
            }
            "remove-fault" => {
                let (words, _) = take_words(rest, 1);
                let id = words
                    .first()
                    .ok_or(ConsoleError::Usage("remove-fault <fault-id>"))?;
                Ok(Self::RemoveFault(fault_id(id)?))
            }
            "clear" => Ok(Self::Clear),
            "stats" => Ok(Self::Stats),
            "messages" => Ok(Self::Messages(TrafficFilter::parse(rest)?)),
            "signals" => {
                let key = rest.trim_matches('"').trim();
                Ok(Self::Signals((!key.is_empty()).then(|| key.to_string())))
            }
            "export" => {
                let (words, path) = take_words(rest, 1);
                let name = words
                    .first()
                    .ok_or(ConsoleError::Usage("export <log|asc|csv> [path]"))?;
                let format = name
                    .parse()
                    .map_err(|_| ConsoleError::UnknownFormat(name.to_string()))?;
                Ok(Self::Export {
                    format,
                    path: (!path.is_empty()).then(|| PathBuf::from(path)),
                })
            }
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(ConsoleError::UnknownCommand(other.to_string())),
        }
    }
}

/// Console state bound to one session
pub struct Console {
    handle: SessionHandle,
    view: TrafficView,
    list_limit: usize,
}

impl Console {
    pub fn new(handle: SessionHandle, settings: &Settings) -> Self {
        Self {
            handle,
            view: TrafficView::new(settings.export.clone()),
            list_limit: settings.list_limit.max(1),
        }
    }

    /// Resolve a fault target given as a node id to that node's name
    async fn resolve_target(&self, target: String) -> Result<String> {
        if target.starts_with("ecu_") {
            if let Ok(id) = target.parse::<NodeId>() {
                let snapshot = self.handle.snapshot().await?;
                if let Some(node) = snapshot.nodes.iter().find(|n| n.id == id) {
                    return Ok(node.name.clone());
                }
            }
        }
        Ok(target)
    }

    /// Execute one command, writing its output to `out`
    ///
    /// Returns `false` when the console should exit.
    pub async fn execute(&mut self, command: ConsoleCommand, out: &mut impl Write) -> Result<bool> {
        debug!(?command, "console command");
        match command {
            ConsoleCommand::Start => {
                self.handle.start().await?;
            }
            ConsoleCommand::Stop => {
                self.handle.stop().await?;
            }
            ConsoleCommand::Nodes => {
                let snapshot = self.handle.snapshot().await?;
                writeln!(
                    out,
                    "{:<8} {:<26} {:<13} {:<8} {}",
                    "ID", "NAME", "KIND", "PROTOCOL", "STATUS"
                )?;
                for node in &snapshot.nodes {
                    writeln!(
                        out,
                        "{:<8} {:<26} {:<13} {:<8} {}",
                        node.id.to_string(),
                        node.name,
                        node.kind.name(),
                        node.protocol.name(),
                        node.status.name()
                    )?;
                    let params: Vec<String> = node
                        .parameters
                        .iter()
                        .map(|(signal, value)| format!("{signal}={value:.2}"))
                        .collect();
                    writeln!(out, "         {}", params.join(" "))?;
                }
            }
            ConsoleCommand::AddNode {
                kind,
                protocol,
                name,
            } => {
                let node = self.handle.add_node(name, kind, protocol).await?;
                writeln!(out, "added {} {}", node.id, node.name)?;
            }
            ConsoleCommand::Status { id, status } => {
                if self.handle.set_status(id, status).await? {
                    writeln!(out, "{id} is {}", status.name())?;
                } else {
                    writeln!(out, "{id} is already {}", status.name())?;
                }
            }
            ConsoleCommand::Set { id, signal, value } => {
                let stored = self.handle.set_parameter(id, signal.clone(), value).await?;
                writeln!(out, "{id} {signal} = {stored:.2}")?;
            }
            ConsoleCommand::Faults => {
                let snapshot = self.handle.snapshot().await?;
                writeln!(
                    out,
                    "{:<9} {:<18} {:<26} {:<9} {:<7} {}",
                    "ID", "TYPE", "TARGET", "SEVERITY", "ACTIVE", "DESCRIPTION"
                )?;
                for fault in &snapshot.faults {
                    writeln!(
                        out,
                        "{:<9} {:<18} {:<26} {:<9} {:<7} {}",
                        fault.id.to_string(),
                        fault.fault_type.name(),
                        fault.target,
                        fault.severity.name(),
                        if fault.active { "yes" } else { "no" },
                        fault.description
                    )?;
                }
            }
            ConsoleCommand::AddFault {
                fault_type,
                target,
                severity,
                description,
            } => {
                let target = self.resolve_target(target).await?;
                let fault = self
                    .handle
                    .add_fault(fault_type, target, severity, description)
                    .await?;
                writeln!(
                    out,
                    "added {} ({} on {}, inactive)",
                    fault.id,
                    fault.fault_type.name(),
                    fault.target
                )?;
            }
            ConsoleCommand::Toggle(id) => {
                let active = self.handle.toggle_fault(id).await?;
                writeln!(out, "{id} {}", if active { "active" } else { "inactive" })?;
            }
            ConsoleCommand::RemoveFault(id) => {
                let fault = self.handle.remove_fault(id).await?;
                writeln!(out, "removed {} ({})", fault.id, fault.description)?;
            }
            ConsoleCommand::Clear => {
                self.handle.clear().await?;
            }
            ConsoleCommand::Stats => {
                let snapshot = self.handle.snapshot().await?;
                let active_nodes = snapshot.nodes.iter().filter(|n| n.is_active()).count();
                let active_faults = snapshot.faults.iter().filter(|f| f.active).count();
                writeln!(
                    out,
                    "state:        {}",
                    if snapshot.is_running { "running" } else { "stopped" }
                )?;
                writeln!(out, "nodes:        {active_nodes}/{} active", snapshot.nodes.len())?;
                writeln!(out, "faults:       {active_faults}/{} active", snapshot.faults.len())?;
                writeln!(out, "messages:     {}", snapshot.messages.len())?;
                writeln!(out, "data points:  {}", snapshot.data_points.len())?;
                writeln!(out, "emitted:      {}", snapshot.emitted_since_start)?;
                writeln!(out, "bus load:     {:.1}%", snapshot.gauges.bus_load)?;
                writeln!(out, "error rate:   {:.1}%", snapshot.gauges.error_rate)?;
            }
            ConsoleCommand::Messages(filter) => {
                self.view.set_filter(filter);
                let snapshot = self.handle.snapshot().await?;
                let shown = self.view.filtered(&snapshot.messages);
                let skip = shown.len().saturating_sub(self.list_limit);
                for message in &shown[skip..] {
                    writeln!(out, "{}", TrafficView::format_line(message))?;
                }
                if self.view.filter().is_empty() {
                    writeln!(out, "({} of {} buffered)", shown.len() - skip, shown.len())?;
                } else {
                    writeln!(
                        out,
                        "({} of {} matching, {} buffered)",
                        shown.len() - skip,
                        shown.len(),
                        snapshot.messages.len()
                    )?;
                }
            }
            ConsoleCommand::Signals(None) => {
                let latest = self.handle.latest_values().await?;
                if latest.is_empty() {
                    writeln!(out, "(no data points)")?;
                }
                for point in &latest {
                    writeln!(out, "{:<40} {:>12.2} {}", point.parameter, point.value, point.unit)?;
                }
            }
            ConsoleCommand::Signals(Some(parameter)) => {
                let series = self.handle.series(parameter.as_str()).await?;
                let Some(newest) = series.last() else {
                    writeln!(out, "no data points for {parameter}")?;
                    return Ok(true);
                };
                let skip = series.len().saturating_sub(self.list_limit);
                writeln!(
                    out,
                    "{parameter} ({}), last {} of {}",
                    newest.unit,
                    series.len() - skip,
                    series.len()
                )?;
                for point in &series[skip..] {
                    writeln!(out, "  {} {:.2}", iso_timestamp(point.timestamp), point.value)?;
                }
            }
            ConsoleCommand::Export { format, path } => {
                let snapshot = self.handle.snapshot().await?;
                let path = self
                    .view
                    .save_export(&snapshot.messages, format, path.as_deref())?;
                writeln!(
                    out,
                    "exported {} messages to {}",
                    snapshot.messages.len(),
                    path.display()
                )?;
            }
            ConsoleCommand::Help => {
                writeln!(out, "{HELP}")?;
            }
            ConsoleCommand::Quit => return Ok(false),
        }
        Ok(true)
    }
}

/// Echo session lifecycle events until the session closes
async fn report_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Started { period }) => {
                println!("started (tick every {} ms)", period.as_millis());
            }
            Ok(SessionEvent::Stopped) => println!("stopped"),
            Ok(SessionEvent::Cleared) => println!("history cleared"),
            Ok(SessionEvent::Error { source, message }) => {
                eprintln!("error: {source}: {message}");
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Read commands from stdin until `quit` or end of input
pub async fn run(handle: SessionHandle, settings: &Settings) -> Result<()> {
    let mut console = Console::new(handle.clone(), settings);
    let reporter = tokio::spawn(report_events(handle.subscribe()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    println!("busview console, type `help` for commands");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let keep_going = match line.parse::<ConsoleCommand>() {
            Ok(command) => match console.execute(command, &mut stdout).await {
                Ok(keep_going) => keep_going,
                Err(e) => {
                    eprintln!("error: {e:#}");
                    true
                }
            },
            Err(e) => {
                eprintln!("error: {e}");
                true
            }
        };
        stdout.flush()?;
        if !keep_going {
            break;
        }
    }

    reporter.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use busview_sim::{spawn_session, SimulationConfig, Synthesizer};

    fn parse(line: &str) -> Result<ConsoleCommand, ConsoleError> {
        line.parse()
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse("start").unwrap(), ConsoleCommand::Start);
        assert_eq!(parse("  STOP ").unwrap(), ConsoleCommand::Stop);
        assert_eq!(parse("exit").unwrap(), ConsoleCommand::Quit);
        assert_eq!(
            parse("launch").unwrap_err(),
            ConsoleError::UnknownCommand("launch".to_string())
        );
    }

    #[test]
    fn test_parse_add_node_keeps_spaced_name() {
        assert_eq!(
            parse("add-node transmission can-fd Rear Axle Controller").unwrap(),
            ConsoleCommand::AddNode {
                kind: NodeKind::Transmission,
                protocol: Protocol::CanFd,
                name: "Rear Axle Controller".to_string(),
            }
        );
        assert!(matches!(
            parse("add-node engine can"),
            Err(ConsoleError::Usage(_))
        ));
        assert!(matches!(
            parse("add-node rocket can X"),
            Err(ConsoleError::Parse(ParseError::UnknownNodeKind(_)))
        ));
    }

    #[test]
    fn test_parse_add_fault_with_quoted_target() {
        assert_eq!(
            parse("add-fault bit_error \"Engine ECU\" high flipped bits on sensor line").unwrap(),
            ConsoleCommand::AddFault {
                fault_type: FaultType::BitError,
                target: "Engine ECU".to_string(),
                severity: Severity::High,
                description: "flipped bits on sensor line".to_string(),
            }
        );
        assert!(matches!(
            parse("add-fault bit_error ecu_1 high"),
            Err(ConsoleError::Usage(_))
        ));
    }

    #[test]
    fn test_parse_ids_and_values() {
        assert_eq!(
            parse("status ecu_2 bus-off").unwrap(),
            ConsoleCommand::Status {
                id: NodeId(2),
                status: NodeStatus::BusOff,
            }
        );
        assert_eq!(
            parse("set ecu_1 rpm 3000.5").unwrap(),
            ConsoleCommand::Set {
                id: NodeId(1),
                signal: "rpm".to_string(),
                value: 3000.5,
            }
        );
        assert_eq!(parse("toggle fault_3").unwrap(), ConsoleCommand::Toggle(FaultId(3)));
        assert_eq!(parse("remove-fault 4").unwrap(), ConsoleCommand::RemoveFault(FaultId(4)));
        assert_eq!(
            parse("toggle nope").unwrap_err(),
            ConsoleError::InvalidId("nope".to_string())
        );
        assert_eq!(
            parse("set ecu_1 rpm fast").unwrap_err(),
            ConsoleError::InvalidValue("fast".to_string())
        );
    }

    #[test]
    fn test_parse_messages_and_export() {
        assert_eq!(
            parse("messages proto=lin errors").unwrap(),
            ConsoleCommand::Messages(TrafficFilter {
                protocol: Some(Protocol::Lin),
                errors_only: true,
                ..Default::default()
            })
        );
        assert_eq!(
            parse("export csv /tmp/traffic.csv").unwrap(),
            ConsoleCommand::Export {
                format: ExportFormat::Csv,
                path: Some(PathBuf::from("/tmp/traffic.csv")),
            }
        );
        assert_eq!(
            parse("export asc").unwrap(),
            ConsoleCommand::Export {
                format: ExportFormat::Asc,
                path: None,
            }
        );
        assert_eq!(
            parse("export blf").unwrap_err(),
            ConsoleError::UnknownFormat("blf".to_string())
        );
    }

    #[test]
    fn test_parse_signals() {
        assert_eq!(parse("signals").unwrap(), ConsoleCommand::Signals(None));
        assert_eq!(
            parse("signals Engine ECU_rpm").unwrap(),
            ConsoleCommand::Signals(Some("Engine ECU_rpm".to_string()))
        );
        assert_eq!(
            parse("signals \"Central Gateway_busLoad\"").unwrap(),
            ConsoleCommand::Signals(Some("Central Gateway_busLoad".to_string()))
        );
    }

    #[test]
    fn test_take_words() {
        let (words, rest) = take_words("  a  \"b c\" d e f", 3);
        assert_eq!(words, vec!["a", "b c", "d"]);
        assert_eq!(rest, "e f");

        let (words, rest) = take_words("one", 3);
        assert_eq!(words, vec!["one"]);
        assert_eq!(rest, "");
    }

    async fn console() -> Console {
        let sim = Synthesizer::new(SimulationConfig {
            seed: Some(5),
            ..Default::default()
        });
        let (handle, _events, _task) = spawn_session(sim);
        Console::new(handle, &Settings::default())
    }

    async fn exec(console: &mut Console, line: &str) -> String {
        let mut out = Vec::new();
        let keep_going = console.execute(parse(line).unwrap(), &mut out).await.unwrap();
        assert!(keep_going);
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_node_commands_drive_session() {
        let mut console = console().await;

        let output = exec(&mut console, "add-node sensor lin Cabin Sensor").await;
        assert_eq!(output, "added ecu_5 Cabin Sensor\n");

        let output = exec(&mut console, "status ecu_5 inactive").await;
        assert_eq!(output, "ecu_5 is inactive\n");

        let output = exec(&mut console, "nodes").await;
        assert!(output.contains("Engine ECU"));
        assert!(output.contains("Cabin Sensor"));
        assert!(output.contains("inactive"));
    }

    #[tokio::test]
    async fn test_fault_target_resolves_node_id() {
        let mut console = console().await;

        let output = exec(&mut console, "add-fault corrupt_crc ecu_1 medium checksum drift").await;
        assert_eq!(output, "added fault_1 (corrupt_crc on Engine ECU, inactive)\n");

        let output = exec(&mut console, "toggle fault_1").await;
        assert_eq!(output, "fault_1 active\n");

        let output = exec(&mut console, "faults").await;
        assert!(output.contains("Engine ECU"));
        assert!(output.contains("checksum drift"));
    }

    #[tokio::test]
    async fn test_unknown_node_is_an_error() {
        let mut console = console().await;
        let mut out = Vec::new();
        let result = console
            .execute(parse("status ecu_99 active").unwrap(), &mut out)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signals_show_data_point_history() {
        let mut console = console().await;

        let output = exec(&mut console, "signals").await;
        assert_eq!(output, "(no data points)\n");

        console.handle.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        console.handle.stop().await.unwrap();

        let output = exec(&mut console, "signals").await;
        let latest = console.handle.latest_values().await.unwrap();
        assert_eq!(output.lines().count(), latest.len());
        for point in &latest {
            assert!(output.contains(&point.parameter));
        }

        let key = latest[0].parameter.clone();
        let total = console.handle.series(key.as_str()).await.unwrap().len();
        let output = exec(&mut console, &format!("signals {key}")).await;
        let mut lines = output.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with(&format!("{key} ({})", latest[0].unit)));
        assert_eq!(lines.count(), total.min(Settings::default().list_limit));

        let output = exec(&mut console, "signals Nobody_rpm").await;
        assert_eq!(output, "no data points for Nobody_rpm\n");
    }

    #[tokio::test]
    async fn test_quit_ends_console() {
        let mut console = console().await;
        let mut out = Vec::new();
        assert!(!console.execute(ConsoleCommand::Quit, &mut out).await.unwrap());
    }
}
