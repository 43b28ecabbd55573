//! The SK-sync session controller.
//!
//! One agent-callable spawn tool plus the lifecycle hooks that reconcile
//! terminal session state and task status back into Super-Kanban, including
//! waking a parent session when a spawned child finishes.

pub mod controller;
pub mod outcome;
pub mod spawn;
pub mod traits;
pub mod wake;

pub use controller::{
    AgentEndEvent, SessionController, SubagentEndedEvent, SubagentSpawnedEvent,
};
pub use outcome::map_outcome;
pub use spawn::{SpawnLevel, SpawnOutcome, SpawnParams};
pub use traits::{
    AgentSessions, GatewayRpc, SpawnSessionRequest, SpawnSessionResult, WakeDeliver, WakeRequest,
};
pub use wake::WakeTracker;
