//! Message filtering

use busview_protocol::{Message, ParseError, Priority, Protocol};

/// Criteria a message must meet to be shown or exported
///
/// Empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficFilter {
    /// Case-insensitive text matched against arbitration id, hex data and sender
    pub search: String,
    /// Only this protocol
    pub protocol: Option<Protocol>,
    /// Only this priority
    pub priority: Option<Priority>,
    /// Only this exact sender name
    pub sender: Option<String>,
    /// Only frames carrying error flags
    pub errors_only: bool,
}

impl TrafficFilter {
    /// Parse console filter arguments
    ///
    /// Accepts `proto=<name>`, `prio=<name>`, `errors`, and `sender=<name…>`
    /// (which takes the rest of the line). Any other words form the search text.
    pub fn parse(args: &str) -> Result<Self, ParseError> {
        let mut filter = Self::default();
        let mut search = Vec::new();
        let mut rest = args.trim();

        while !rest.is_empty() {
            let (word, tail) = match rest.split_once(char::is_whitespace) {
                Some((w, t)) => (w, t.trim_start()),
                None => (rest, ""),
            };

            if let Some(value) = word.strip_prefix("sender=") {
                let name = format!("{} {}", value, tail);
                filter.sender = Some(name.trim().to_string());
                break;
            } else if let Some(value) = word.strip_prefix("proto=") {
                filter.protocol = Some(value.parse()?);
            } else if let Some(value) = word.strip_prefix("prio=") {
                filter.priority = Some(value.parse()?);
            } else if word.eq_ignore_ascii_case("errors") {
                filter.errors_only = true;
            } else {
                search.push(word);
            }
            rest = tail;
        }

        filter.search = search.join(" ");
        Ok(filter)
    }

    /// Whether a message passes every criterion
    pub fn matches(&self, message: &Message) -> bool {
        if self.protocol.is_some_and(|p| p != message.protocol) {
            return false;
        }
        if self.priority.is_some_and(|p| p != message.priority) {
            return false;
        }
        if self.sender.as_ref().is_some_and(|s| *s != message.sender) {
            return false;
        }
        if self.errors_only && !message.has_errors() {
            return false;
        }
        if self.search.is_empty() {
            return true;
        }

        let needle = self.search.to_lowercase();
        message
            .arbitration_id
            .to_string()
            .to_lowercase()
            .contains(&needle)
            || message.data_hex().to_lowercase().contains(&needle)
            || message.sender.to_lowercase().contains(&needle)
    }

    /// Whether the filter restricts anything
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
