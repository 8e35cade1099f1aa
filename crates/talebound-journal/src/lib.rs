//! Talebound Journal - append-only session logs, auditing and export
//!
//! This crate builds on `talebound-core`'s event model to provide:
//!
//! - **LogStore**: per-session, append-only event storage that owns id assignment
//! - **SessionDocument**: import and export of whole sessions as `{id, campaign, events}` files
//! - **Auditor**: query and analyze recorded events and unresolved diagnostics
//! - **Exporter**: export a log as JSON lines, JSON, RON or text
//!
//! # Example
//!
//! ```rust
//! use talebound_core::{EventId, NewEvent, Reducer, SessionId};
//! use talebound_journal::{Auditor, LogStore, MemoryStore};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! let session = SessionId::new("2024-01-15-0001");
//! store.create_session(&session, "bastards-blood")?;
//!
//! store.append(
//!     &session,
//!     NewEvent::new("create_char")
//!         .data(json!({"character": {"id": "kara", "name": "Kara", "hp": {"max": 20}}})),
//! )?;
//! store.append(&session, NewEvent::new("damage").target("kara").data(json!({"amount": 4})))?;
//!
//! let events = store.list(&session, EventId::new(0))?;
//! let reduction = Reducer::default().replay(session, &events);
//! let report = Auditor::new(&events).with_reduction(&reduction).generate_report();
//! assert_eq!(report.total_events, 2);
//! # Ok::<(), talebound_journal::StoreError>(())
//! ```

mod auditor;
mod codec;
mod error;
mod exporter;
mod store;

pub use auditor::{AuditQuery, AuditReport, Auditor, EventSummary, UnresolvedSummary};
pub use codec::{from_json_lines, to_json_lines, SessionDocument};
pub use error::{Result, StoreError};
pub use exporter::{ExportFormat, Exporter};
pub use store::{LogStore, MemoryStore, SessionMeta};

#[cfg(any(test, feature = "test-utils"))]
pub use store::FlakyStore;
