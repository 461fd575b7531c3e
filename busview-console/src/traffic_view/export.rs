//! Traffic log export functionality

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use busview_protocol::{Message, Protocol};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::TrafficView;

/// Text formats the message history can be exported to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One human-readable line per frame
    #[default]
    Log,
    /// Simplified ASCII logger format
    Asc,
    /// Comma-separated values
    Csv,
}

impl ExportFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Log => "log",
            ExportFormat::Asc => "asc",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s.trim(), true)
    }
}

/// Export options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Default export format
    pub format: ExportFormat,
    /// Include timestamps in log and CSV output
    pub include_timestamp: bool,
    /// Include payload bytes in log and CSV output
    pub include_data: bool,
    /// Export only frames of this protocol
    pub protocol: Option<Protocol>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: ExportFormat::Log,
            include_timestamp: true,
            include_data: true,
            protocol: None,
        }
    }
}

/// ISO-8601 UTC timestamp with milliseconds
pub(crate) fn iso_timestamp(timestamp: SystemTime) -> String {
    DateTime::<Utc>::from(timestamp).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Seconds since the epoch with millisecond precision
fn epoch_seconds(timestamp: SystemTime) -> String {
    let millis = timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}.{:03}", millis / 1000, millis % 1000)
}

/// Quote a CSV field when it contains a separator or quote
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl TrafficView {
    /// Format messages in the requested format, honoring export options
    pub fn format_export(&self, messages: &[Message], format: ExportFormat) -> String {
        let selected: Vec<&Message> = messages
            .iter()
            .filter(|m| self.export.protocol.is_none_or(|p| p == m.protocol))
            .collect();

        match format {
            ExportFormat::Log => self.format_log(&selected),
            ExportFormat::Asc => Self::format_asc(&selected),
            ExportFormat::Csv => self.format_csv(&selected),
        }
    }

    fn format_log(&self, messages: &[&Message]) -> String {
        let mut output = String::new();
        for msg in messages {
            if self.export.include_timestamp {
                output.push_str(&iso_timestamp(msg.timestamp));
                output.push(' ');
            }
            output.push_str(&format!(
                "{} {} [{}]",
                msg.protocol, msg.arbitration_id, msg.dlc
            ));
            if self.export.include_data {
                output.push_str(" Data: ");
                output.push_str(&msg.data_hex());
            }
            output.push_str(" - ");
            output.push_str(&msg.sender);
            output.push('\n');
        }
        output
    }

    fn format_asc(messages: &[&Message]) -> String {
        let start = messages
            .first()
            .map(|m| m.timestamp)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let date = DateTime::<Utc>::from(start).format("%a %b %d %H:%M:%S%.3f %Y");

        let mut output = String::new();
        output.push_str(&format!("date {}\n", date));
        output.push_str("base hex  timestamps absolute\n");
        output.push_str("internal events logged\n");

        for msg in messages {
            output.push_str(&format!(
                "{} 1 {:X}x Rx d {} {}\n",
                epoch_seconds(msg.timestamp),
                msg.arbitration_id.raw(),
                msg.dlc,
                msg.data_hex()
            ));
        }
        output
    }

    fn format_csv(&self, messages: &[&Message]) -> String {
        let mut output = String::from("Timestamp,Type,Arbitration ID,DLC,Data,Sender,Priority\n");
        for msg in messages {
            let timestamp = if self.export.include_timestamp {
                iso_timestamp(msg.timestamp)
            } else {
                String::new()
            };
            let data = if self.export.include_data {
                msg.data_hex()
            } else {
                String::new()
            };
            let row = [
                timestamp,
                msg.protocol.to_string(),
                msg.arbitration_id.to_string(),
                msg.dlc.to_string(),
                data,
                csv_field(&msg.sender),
                msg.priority.to_string(),
            ];
            output.push_str(&row.join(","));
            output.push('\n');
        }
        output
    }

    /// Default file name for an export started now
    pub fn default_file_name(format: ExportFormat) -> String {
        format!(
            "busview_export_{}.{}",
            Utc::now().format("%Y-%m-%dT%H-%M-%S"),
            format.extension()
        )
    }

    /// Write an export to `path`, or to a timestamped file in the current directory
    pub fn save_export(
        &self,
        messages: &[Message],
        format: ExportFormat,
        path: Option<&Path>,
    ) -> std::io::Result<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(Self::default_file_name(format)));
        std::fs::write(&path, self.format_export(messages, format))?;
        Ok(path)
    }
}
