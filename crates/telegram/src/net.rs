//! Outbound network adapter.
//!
//! Two concerns live here: apply-once runtime tuning for the shared HTTP
//! client (address-family fallback and DNS result order), and an opt-in
//! diagnostic tap that describes every Telegram API call — method, redacted
//! path, payload fingerprint — without ever interfering with the request.

use std::sync::OnceLock;

use parking_lot::Mutex;
use reqwest::Client;
use sha2::{Digest, Sha256};

use sk_domain::trace::TraceEvent;

use crate::context;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Apply-once tuning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Attempt timeout used for the address-family fallback.
const FAMILY_ATTEMPT_TIMEOUT_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsResultOrder {
    Ipv4First,
    Verbatim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTuning {
    /// Allow falling back across address families on connect.
    pub auto_select_family: bool,
    pub dns_result_order: DnsResultOrder,
}

impl Default for NetworkTuning {
    fn default() -> Self {
        Self {
            auto_select_family: true,
            dns_result_order: DnsResultOrder::Ipv4First,
        }
    }
}

struct AdapterState {
    applied: Option<NetworkTuning>,
    client: Option<Client>,
}

fn adapter() -> &'static Mutex<AdapterState> {
    static STATE: OnceLock<Mutex<AdapterState>> = OnceLock::new();
    STATE.get_or_init(|| {
        Mutex::new(AdapterState {
            applied: None,
            client: None,
        })
    })
}

/// Apply the tuning to the shared client.  Re-applying an identical value is
/// a no-op; returns whether anything changed.  The replacement matters even
/// for pre-built clients: the shared client is rebuilt so earlier handles
/// cannot keep the stale settings alive.
pub fn apply_network_tuning(tuning: NetworkTuning) -> bool {
    let mut state = adapter().lock();
    if state.applied == Some(tuning) {
        return false;
    }

    let mut builder = Client::builder();
    if tuning.auto_select_family {
        builder = builder.connect_timeout(std::time::Duration::from_millis(
            FAMILY_ATTEMPT_TIMEOUT_MS,
        ));
    }
    match builder.build() {
        Ok(client) => {
            state.client = Some(client);
            state.applied = Some(tuning);
            tracing::info!(
                auto_select_family = tuning.auto_select_family,
                dns_order = ?tuning.dns_result_order,
                "network tuning applied"
            );
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "network tuning failed, keeping previous client");
            false
        }
    }
}

/// The shared tuned client (default-built on first use).
pub fn shared_client() -> Client {
    let mut state = adapter().lock();
    if state.client.is_none() {
        state.client = Some(Client::new());
    }
    state.client.clone().expect("just initialized")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Diagnostic fetch tap
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const TELEGRAM_API_HOST: &str = "api.telegram.org";

/// One diagnostic record per tapped call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchDiagnostics {
    pub delivery_id: String,
    pub http_method: String,
    pub api_method: String,
    pub path: String,
    pub payload_hash: String,
}

/// A fetch wrapper that emits one `telegram.http.fetch` diagnostic per call
/// to the Telegram API, then forwards the original request.  Diagnostic
/// failures never reach the caller.
pub struct DiagFetch {
    client: Client,
    enabled: bool,
}

impl DiagFetch {
    pub fn new(enabled: bool) -> Self {
        Self {
            client: shared_client(),
            enabled,
        }
    }

    pub async fn execute(&self, request: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        if self.enabled {
            if let Some(diag) = diagnostics_for(&request) {
                TraceEvent::TelegramFetch {
                    delivery_id: diag.delivery_id,
                    http_method: diag.http_method,
                    api_method: diag.api_method,
                    path: diag.path,
                    payload_hash: diag.payload_hash,
                }
                .emit();
            }
        }
        self.client.execute(request).await
    }
}

/// Describe a request bound for the Telegram API; `None` for other hosts.
/// Reads the current delivery context for correlation.
pub fn diagnostics_for(request: &reqwest::Request) -> Option<FetchDiagnostics> {
    let url = request.url();
    if url.host_str() != Some(TELEGRAM_API_HOST) {
        return None;
    }
    let (api_method, path) = redact_bot_path(url.path())?;

    let body_bytes = request.body().and_then(|b| b.as_bytes());
    let summary = summarize_body(body_bytes);
    let payload_hash = hex::encode(Sha256::digest(summary.to_string().as_bytes()));

    Some(FetchDiagnostics {
        delivery_id: context::current()
            .map(|c| c.delivery_id)
            .unwrap_or_default(),
        http_method: request.method().to_string(),
        api_method,
        path,
        payload_hash,
    })
}

/// `/bot<token>/<method>` → `("<method>", "/bot<redacted>/<method>")`;
/// `/file/bot<token>/<rest>` analogously with `"file"` as the method.
fn redact_bot_path(path: &str) -> Option<(String, String)> {
    if let Some(rest) = path.strip_prefix("/file/bot") {
        let (_token, tail) = rest.split_once('/')?;
        return Some(("file".to_owned(), format!("/file/bot<redacted>/{tail}")));
    }
    if let Some(rest) = path.strip_prefix("/bot") {
        let (_token, method) = rest.split_once('/')?;
        if method.is_empty() {
            return None;
        }
        return Some((method.to_owned(), format!("/bot<redacted>/{method}")));
    }
    None
}

/// Type-tagged body summary.  The hash downstream is over this rendering,
/// so identical payloads fingerprint identically regardless of transport
/// details.
fn summarize_body(bytes: Option<&[u8]>) -> serde_json::Value {
    match bytes {
        None => serde_json::json!({ "type": "none" }),
        Some(b) => match std::str::from_utf8(b) {
            Ok(s) => serde_json::json!({ "type": "string", "value": s }),
            Err(_) => serde_json::json!({ "type": "bytes", "len": b.len() }),
        },
    }
}
