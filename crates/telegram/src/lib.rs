//! Telegram delivery plumbing: the ambient per-delivery correlation
//! context, voice-send deduplication, and the outbound network adapter
//! with its diagnostic fetch tap.

pub mod context;
pub mod dedupe;
pub mod lane;
pub mod net;

pub use context::{current, run_with, with_partial, DeliveryContext, PartialDeliveryContext};
pub use dedupe::{voice_fingerprint, VoiceDeduper};
pub use lane::LaneGate;
pub use net::{
    apply_network_tuning, diagnostics_for, shared_client, DiagFetch, DnsResultOrder,
    FetchDiagnostics, NetworkTuning,
};
