/// Shared error type used across all sk-sync crates.
///
/// Variants map one-to-one onto the failure kinds the pipeline distinguishes:
/// transport problems are retriable, protocol problems carry the server's
/// status and body, and the rest are terminal for the operation that raised
/// them.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Network / DNS / connection failure. Retriable with backoff.
    #[error("transport: {0}")]
    Transport(String),

    /// An in-flight request was cancelled by its timeout budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Non-2xx response with a readable body. Not retried.
    #[error("super-kanban returned {status}: {body}")]
    Protocol { status: u16, body: String },

    /// No credential resolvable for the requested auth scope.
    #[error("auth missing for scope {0}")]
    AuthMissing(String),

    /// External-ID canonicalization failed or parent keys mismatched.
    #[error("invalid external id: {0}")]
    InvalidExternalId(String),

    /// No session binding resolvable for an (agent, session) pair.
    #[error("no binding for {0}")]
    BindingMissing(String),

    /// A task lock is already held by another owner.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the sender should retry this failure with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
