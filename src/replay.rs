//! Reading recorded bus events, one JSON object per line.

use std::io::BufRead;

use crate::action::ActionEvent;
use crate::error::{ConfigError, Error, TranslationError};

/// Parse JSON-lines events. Blank lines and lines starting with `#` are skipped.
pub fn read_events(reader: impl BufRead) -> Result<Vec<ActionEvent>, Error> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(ConfigError::Io)?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let value: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
            TranslationError::MalformedEvent(format!("line {}: {e}", index + 1))
        })?;
        let event = ActionEvent::from_value(value).map_err(|e| {
            TranslationError::MalformedEvent(format!("line {}: {e}", index + 1))
        })?;
        events.push(event);
    }
    Ok(events)
}
