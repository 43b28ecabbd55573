//! Transcript-side of the export pipeline: turning raw JSONL lines into
//! normalized records, scrubbing them, and resolving which Super-Kanban
//! entity a session belongs to.

pub mod bindings;
pub mod label_map;
pub mod parser;
pub mod redact;

pub use bindings::BindingResolver;
pub use label_map::{LabelMapEntry, LabelMapStore};
pub use parser::{parse_transcript_line, ParsedLine};
pub use redact::Redactor;
