//! Auditing and analytics for session logs

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use talebound_core::{CharacterId, Event, EventId, EventKind, Reduction};

/// Auditor for querying and analyzing a session's events
pub struct Auditor<'a> {
    events: &'a [Event],
    reduction: Option<&'a Reduction>,
}

impl<'a> Auditor<'a> {
    /// Create a new auditor over events in log order
    pub fn new(events: &'a [Event]) -> Self {
        Self {
            events,
            reduction: None,
        }
    }

    /// Include the unresolved events of a reduction in reports
    pub fn with_reduction(mut self, reduction: &'a Reduction) -> Self {
        self.reduction = Some(reduction);
        self
    }

    /// Generate a comprehensive audit report
    pub fn generate_report(&self) -> AuditReport {
        let mut event_counts: IndexMap<String, u64> = IndexMap::new();
        let mut actor_actions: IndexMap<String, u64> = IndexMap::new();
        let mut characters_created: Vec<CharacterId> = Vec::new();

        for event in self.events {
            *event_counts
                .entry(event.kind.as_str().to_string())
                .or_insert(0) += 1;

            if let Some(actor) = &event.actor {
                *actor_actions.entry(actor.to_string()).or_insert(0) += 1;
            }

            if event.kind == EventKind::CreateChar {
                for id in event.payload.characters() {
                    if !characters_created.contains(id) {
                        characters_created.push(id.clone());
                    }
                }
            }
        }

        let unresolved = self
            .reduction
            .map(|r| {
                r.unresolved
                    .iter()
                    .map(|u| UnresolvedSummary {
                        event_id: u.event_id,
                        kind: u.kind,
                        reason: u.warning.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        AuditReport {
            total_events: self.events.len(),
            first_event: self.events.first().map(|e| e.id),
            last_event: self.events.last().map(|e| e.id),
            first_ts: self.events.first().map(|e| e.ts),
            last_ts: self.events.last().map(|e| e.ts),
            event_counts,
            actor_actions,
            characters_created,
            unresolved,
        }
    }

    /// Events matching specific criteria
    pub fn query(&self, query: &AuditQuery) -> Vec<&'a Event> {
        self.events
            .iter()
            .filter(|event| query.matches(event))
            .collect()
    }

    /// Get a summary of events acted by a character
    pub fn actor_summary(&self, actor: &CharacterId) -> EventSummary {
        let mut total = 0;
        let mut by_kind: IndexMap<String, u64> = IndexMap::new();

        for event in self.events {
            if event.actor.as_ref() == Some(actor) {
                total += 1;
                *by_kind.entry(event.kind.as_str().to_string()).or_insert(0) += 1;
            }
        }

        EventSummary { total, by_kind }
    }

    /// Count occurrences of one kind
    pub fn count_kind(&self, kind: EventKind) -> u64 {
        self.events.iter().filter(|e| e.kind == kind).count() as u64
    }

    /// Every kind that occurs, in declaration order
    pub fn unique_kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<EventKind> = self.events.iter().map(|e| e.kind).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

/// A comprehensive audit report
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub total_events: usize,
    pub first_event: Option<EventId>,
    pub last_event: Option<EventId>,
    pub first_ts: Option<DateTime<Utc>>,
    pub last_ts: Option<DateTime<Utc>>,
    /// Count of each event kind, in order of first appearance
    pub event_counts: IndexMap<String, u64>,
    /// Events by acting character
    pub actor_actions: IndexMap<String, u64>,
    /// Characters introduced by `create_char`, in order
    pub characters_created: Vec<CharacterId>,
    /// Events that could not be applied (empty without a reduction)
    pub unresolved: Vec<UnresolvedSummary>,
}

impl std::fmt::Display for AuditReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Audit Report ===")?;
        writeln!(f, "Total events: {}", self.total_events)?;

        if let (Some(first), Some(last)) = (self.first_event, self.last_event) {
            writeln!(f, "Event range: {} - {}", first, last)?;
        }
        if let (Some(first), Some(last)) = (self.first_ts, self.last_ts) {
            writeln!(f, "Time range: {} - {}", first.to_rfc3339(), last.to_rfc3339())?;
        }

        if !self.event_counts.is_empty() {
            writeln!(f, "\nEvents by kind:")?;
            let mut sorted: Vec<_> = self.event_counts.iter().collect();
            sorted.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
            for (kind, count) in sorted {
                writeln!(f, "  {}: {}", kind, count)?;
            }
        }

        if !self.actor_actions.is_empty() {
            writeln!(f, "\nActions by actor:")?;
            for (actor, count) in &self.actor_actions {
                writeln!(f, "  {}: {}", actor, count)?;
            }
        }

        if !self.characters_created.is_empty() {
            let names: Vec<&str> = self.characters_created.iter().map(|c| c.as_str()).collect();
            writeln!(f, "\nCharacters: {}", names.join(", "))?;
        }

        if !self.unresolved.is_empty() {
            writeln!(f, "\nUnresolved events:")?;
            for u in &self.unresolved {
                writeln!(f, "  {} {}: {}", u.event_id, u.kind, u.reason)?;
            }
        }

        Ok(())
    }
}

/// One event the reducer could not apply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedSummary {
    pub event_id: EventId,
    pub kind: EventKind,
    pub reason: String,
}

/// Query criteria for filtering events
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// First event id (inclusive)
    pub from_id: Option<EventId>,
    /// Last event id (inclusive)
    pub to_id: Option<EventId>,
    /// Earliest timestamp (inclusive)
    pub since: Option<DateTime<Utc>>,
    /// Latest timestamp (inclusive)
    pub until: Option<DateTime<Utc>>,
    /// Filter by acting character
    pub actor: Option<CharacterId>,
    /// Filter by kind
    pub kind: Option<EventKind>,
    /// Filter by any character the event touches
    pub involving: Option<CharacterId>,
}

impl AuditQuery {
    /// Create a new empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by event id range
    pub fn in_range(mut self, from: EventId, to: EventId) -> Self {
        self.from_id = Some(from);
        self.to_id = Some(to);
        self
    }

    /// Filter by timestamp range
    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn by_actor(mut self, actor: impl Into<CharacterId>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn by_kind(mut self, kind: EventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Events whose actor, target or payload names the character
    pub fn involving(mut self, character: impl Into<CharacterId>) -> Self {
        self.involving = Some(character.into());
        self
    }

    fn matches(&self, event: &Event) -> bool {
        if self.from_id.is_some_and(|from| event.id < from) {
            return false;
        }
        if self.to_id.is_some_and(|to| event.id > to) {
            return false;
        }
        if self.since.is_some_and(|since| event.ts < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.ts > until) {
            return false;
        }
        if let Some(actor) = &self.actor {
            if event.actor.as_ref() != Some(actor) {
                return false;
            }
        }
        if self.kind.is_some_and(|kind| event.kind != kind) {
            return false;
        }
        if let Some(character) = &self.involving {
            let touched = event.actor.as_ref() == Some(character)
                || event.target.as_ref() == Some(character)
                || event.payload.characters().contains(&character);
            if !touched {
                return false;
            }
        }
        true
    }
}

/// Summary of events for one actor
#[derive(Debug, Clone)]
pub struct EventSummary {
    /// Total number of events
    pub total: u64,
    /// Events grouped by kind
    pub by_kind: IndexMap<String, u64>,
}
