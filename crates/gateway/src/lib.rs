//! The sk-sync gateway: per-connection WebSocket core with backpressure
//! protection, readiness/presence state, and the process wiring that hosts
//! the transcript exporter.

pub mod cli;
pub mod conn;
pub mod presence;
pub mod state;
pub mod ws;

pub use conn::{sanitize_header_value, send_guarded, ConnState, ConnectionSink, SendOutcome};
pub use presence::{PresenceRegistry, Readiness, ReadinessPhase};
pub use state::AppState;
