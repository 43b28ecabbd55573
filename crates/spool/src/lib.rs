//! The spool engine: a durable, at-least-once pipeline from transcript files
//! to Super-Kanban.
//!
//! One logical worker per plugin instance.  A tailer tick scans bound
//! transcripts for appended bytes and enqueues normalized events; a sender
//! tick flushes pending events to `spool.jsonl` and dispatches them, with
//! byte cursors and the spool offset persisted in `meta.json` so a crash
//! resumes exactly where it left off.

pub mod backoff;
pub mod engine;
pub mod event;
pub mod meta;
pub mod tailer;

pub use engine::{build_events, SpoolEngine};
pub use event::SpoolEvent;
pub use meta::MetaFile;
