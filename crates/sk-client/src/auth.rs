//! Split-scope credential resolution.
//!
//! `read` covers GET/HEAD/OPTIONS; `write` is everything else.  Resolution
//! order, first hit wins:
//!   1. the per-scope header override,
//!   2. the legacy global header,
//!   3. scope preference — read prefers the bearer token, write prefers the
//!      API key — falling back to the other credential,
//!   4. otherwise the scope has no credential and the call must not be made.

use sk_domain::config::SuperKanbanConfig;
use sk_domain::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScope {
    Read,
    Write,
}

impl AuthScope {
    pub fn for_method(method: &reqwest::Method) -> Self {
        use reqwest::Method;
        match *method {
            Method::GET | Method::HEAD | Method::OPTIONS => Self::Read,
            _ => Self::Write,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Resolve the `(header-name, header-value)` pair for a scope.
pub fn resolve_auth(cfg: &SuperKanbanConfig, scope: AuthScope) -> Result<(String, String)> {
    let scoped_header = match scope {
        AuthScope::Read => cfg.read_header.as_deref(),
        AuthScope::Write => cfg.write_header.as_deref(),
    };
    if let Some(pair) = scoped_header {
        return parse_header_pair(pair);
    }
    if cfg.read_header.is_none() && cfg.write_header.is_none() {
        if let Some(pair) = cfg.auth_header.as_deref() {
            return parse_header_pair(pair);
        }
    }

    let bearer = cfg
        .bearer_token
        .as_deref()
        .map(|t| ("Authorization".to_owned(), format!("Bearer {t}")));
    let api_key = cfg
        .api_key
        .as_deref()
        .map(|k| ("X-Api-Key".to_owned(), k.to_owned()));

    let resolved = match scope {
        AuthScope::Read => bearer.or(api_key),
        AuthScope::Write => api_key.or(bearer),
    };
    resolved.ok_or_else(|| Error::AuthMissing(scope.name().to_owned()))
}

fn parse_header_pair(pair: &str) -> Result<(String, String)> {
    let (name, value) = pair
        .split_once(':')
        .ok_or_else(|| Error::Config(format!("auth header must be 'Name: value': {pair}")))?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() || value.is_empty() {
        return Err(Error::Config(format!(
            "auth header must be 'Name: value': {pair}"
        )));
    }
    Ok((name.to_owned(), value.to_owned()))
}
