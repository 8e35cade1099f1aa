//! Export session logs to various formats

use crate::codec::to_json_lines;
use crate::error::{Result, StoreError};
use crate::store::SessionMeta;
use serde::Serialize;
use std::io::Write;
use talebound_core::{Event, EventId, WireEvent};

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One wire event per line
    JsonLines,
    /// Pretty JSON with session stats
    Json,
    /// RON format (Rust Object Notation)
    Ron,
    /// Human-readable text format
    Text,
}

/// Exporter for a session's events
pub struct Exporter<'a> {
    events: &'a [Event],
    meta: Option<&'a SessionMeta>,
}

impl<'a> Exporter<'a> {
    /// Create a new exporter over events in log order
    pub fn new(events: &'a [Event]) -> Self {
        Self { events, meta: None }
    }

    /// Include session metadata in structured exports
    pub fn with_meta(mut self, meta: &'a SessionMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Export to a string in the specified format
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::JsonLines => to_json_lines(self.events),
            ExportFormat::Json => self.to_json(),
            ExportFormat::Ron => self.to_ron(),
            ExportFormat::Text => Ok(self.to_text()),
        }
    }

    /// Export to a writer
    pub fn export_to<W: Write>(&self, writer: &mut W, format: ExportFormat) -> Result<()> {
        let content = self.export(format)?;
        writer.write_all(content.as_bytes())?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        let export = ExportData::new(self.meta, self.events);
        Ok(serde_json::to_string_pretty(&export)?)
    }

    pub fn to_ron(&self) -> Result<String> {
        let export = ExportData::new(self.meta, self.events);
        ron::ser::to_string_pretty(&export, ron::ser::PrettyConfig::default())
            .map_err(|e| StoreError::Codec(e.to_string()))
    }

    /// Export to human-readable text format
    pub fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str("=== Session Export ===\n\n");
        if let Some(meta) = self.meta {
            output.push_str(&format!("Session: {}\n", meta.id));
            output.push_str(&format!("Campaign: {}\n", meta.campaign));
        }
        output.push_str(&format!("Events: {}\n", self.events.len()));
        if let (Some(first), Some(last)) = (self.events.first(), self.events.last()) {
            output.push_str(&format!("Event range: {} - {}\n", first.id, last.id));
        }

        output.push_str("\n=== Events ===\n\n");

        for event in self.events {
            let actor = event
                .actor
                .as_ref()
                .map(|a| format!(" actor={}", a))
                .unwrap_or_default();
            let target = event
                .target
                .as_ref()
                .map(|t| format!(" target={}", t))
                .unwrap_or_default();
            output.push_str(&format!(
                "  {} {} {}{}{}\n",
                event.id,
                event.ts.to_rfc3339(),
                event.kind,
                actor,
                target
            ));
            if let Some(data) = &event.data {
                output.push_str(&format!("      data: {}\n", data));
            }
            if let Some(result) = &event.result {
                output.push_str(&format!("      result: {}\n", result));
            }
        }

        output
    }

    /// Export only events with ids in `start..=end`
    pub fn export_range(&self, start: EventId, end: EventId, format: ExportFormat) -> Result<String> {
        let from = self.events.partition_point(|e| e.id < start);
        let to = self.events.partition_point(|e| e.id <= end);
        let slice = self.events.get(from..to.max(from)).unwrap_or_default();
        Exporter {
            events: slice,
            meta: self.meta,
        }
        .export(format)
    }
}

/// Data structure for structured exports
#[derive(Debug, Clone, Serialize)]
struct ExportData<'a> {
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a SessionMeta>,
    stats: ExportStats,
    events: Vec<WireEvent>,
}

impl<'a> ExportData<'a> {
    fn new(session: Option<&'a SessionMeta>, events: &[Event]) -> Self {
        Self {
            version: 1,
            session,
            stats: ExportStats {
                event_count: events.len(),
                first_event: events.first().map(|e| e.id),
                last_event: events.last().map(|e| e.id),
            },
            events: events.iter().map(Event::to_wire).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ExportStats {
    event_count: usize,
    first_event: Option<EventId>,
    last_event: Option<EventId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LogStore, MemoryStore};
    use serde_json::json;
    use talebound_core::{NewEvent, SessionId};

    fn create_test_log() -> (Vec<Event>, SessionMeta) {
        let store = MemoryStore::new();
        let session = SessionId::new("2024-01-15-0001");
        store.create_session(&session, "bastards-blood").unwrap();
        store
            .append(
                &session,
                NewEvent::new("create_char").data(json!({
                    "character": {"id": "kara", "name": "Kara", "hp": {"max": 20}}
                })),
            )
            .unwrap();
        for amount in [2, 3, 4] {
            store
                .append(
                    &session,
                    NewEvent::new("damage").target("kara").data(json!({ "amount": amount })),
                )
                .unwrap();
        }
        let events = store.list(&session, EventId::new(0)).unwrap();
        let meta = store.session_meta(&session).unwrap();
        (events, meta)
    }

    #[test]
    fn test_export_json() {
        let (events, meta) = create_test_log();
        let json = Exporter::new(&events).with_meta(&meta).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["version"], 1);
        assert_eq!(value["session"]["campaign"], "bastards-blood");
        assert_eq!(value["stats"]["event_count"], 4);
        assert_eq!(value["events"][1]["t"], "damage");
    }

    #[test]
    fn test_export_ron() {
        let (events, _) = create_test_log();
        let ron = Exporter::new(&events).to_ron().unwrap();

        assert!(ron.contains("version"));
        assert!(ron.contains("events"));
        assert!(!ron.contains("session"));
    }

    #[test]
    fn test_export_text() {
        let (events, meta) = create_test_log();
        let text = Exporter::new(&events).with_meta(&meta).to_text();

        assert!(text.contains("Session Export"));
        assert!(text.contains("Campaign: bastards-blood"));
        assert!(text.contains("e_0000000004"));
    }

    #[test]
    fn test_export_range() {
        let (events, _) = create_test_log();
        let exporter = Exporter::new(&events);
        let lines = exporter
            .export_range(EventId::new(2), EventId::new(3), ExportFormat::JsonLines)
            .unwrap();
        assert_eq!(lines.lines().count(), 2);

        let empty = exporter
            .export_range(EventId::new(9), EventId::new(3), ExportFormat::JsonLines)
            .unwrap();
        assert!(empty.is_empty());
    }
}
