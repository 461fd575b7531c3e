//! Traffic view over the message history
//!
//! This module provides the console's view of synthesized traffic, with
//! support for filtering and export to line-oriented text formats.

use busview_protocol::Message;

mod export;
mod filter;

pub(crate) use export::iso_timestamp;
pub use export::{ExportFormat, ExportSettings};
pub use filter::TrafficFilter;

/// Traffic view state
#[derive(Debug, Clone, Default)]
pub struct TrafficView {
    /// Active message filter
    filter: TrafficFilter,
    /// Export options
    export: ExportSettings,
}

impl TrafficView {
    /// Create a view with the given export options and no filter
    pub fn new(export: ExportSettings) -> Self {
        Self {
            filter: TrafficFilter::default(),
            export,
        }
    }

    /// Current filter
    pub fn filter(&self) -> &TrafficFilter {
        &self.filter
    }

    /// Replace the filter
    pub fn set_filter(&mut self, filter: TrafficFilter) {
        self.filter = filter;
    }

    /// Messages passing the filter, oldest first
    pub fn filtered<'a>(&self, messages: &'a [Message]) -> Vec<&'a Message> {
        messages.iter().filter(|m| self.filter.matches(m)).collect()
    }

    /// Format one message as a console line
    pub fn format_line(message: &Message) -> String {
        let flags = if message.has_errors() {
            let names: Vec<&str> = message.error_flags.iter().map(|f| f.as_str()).collect();
            format!(" !{}", names.join(","))
        } else {
            String::new()
        };
        format!(
            "{:>10} {:7} {} [{:>2}] {:23} {:6} {}{}",
            message.id.to_string(),
            message.protocol.name(),
            message.arbitration_id,
            message.dlc,
            message.data_hex(),
            message.priority.name(),
            message.sender,
            flags
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::{Duration, SystemTime};

    use busview_protocol::{ArbitrationId, FrameType, Message, MessageId, Priority, Protocol};

    /// A message at a fixed instant (2024-01-01T00:00:00.250Z)
    pub fn message(id: u64, sender: &str, protocol: Protocol) -> Message {
        Message {
            id: MessageId(id),
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_millis(1_704_067_200_250),
            arbitration_id: ArbitrationId(0x7E0),
            payload: vec![0x12, 0x34, 0x00, 0xFF, 0x01, 0x02, 0x03, 0x04],
            dlc: 8,
            sender: sender.to_string(),
            protocol,
            priority: Priority::High,
            frame_type: FrameType::Data,
            crc_valid: true,
            error_flags: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::message;
    use super::*;
    use busview_protocol::{ErrorFlag, Protocol};

    #[test]
    fn test_filtered_applies_filter() {
        let messages = vec![
            message(1, "Engine ECU", Protocol::Can),
            message(2, "Central Gateway", Protocol::CanFd),
        ];
        let mut view = TrafficView::default();
        assert_eq!(view.filtered(&messages).len(), 2);

        view.set_filter(TrafficFilter {
            protocol: Some(Protocol::CanFd),
            ..Default::default()
        });
        let shown = view.filtered(&messages);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].sender, "Central Gateway");
    }

    #[test]
    fn test_format_line_shows_flags() {
        let mut msg = message(3, "Engine ECU", Protocol::Can);
        let plain = TrafficView::format_line(&msg);
        assert!(plain.contains("0x7E0"));
        assert!(plain.contains("12 34 00 FF 01 02 03 04"));
        assert!(!plain.contains('!'));

        msg.error_flags = vec![ErrorFlag::BitError, ErrorFlag::BusOff];
        let flagged = TrafficView::format_line(&msg);
        assert!(flagged.ends_with("!BIT_ERROR,BUS_OFF"));
    }
}
