//! Base-URL canonicalization.
//!
//! Operators paste anything from the bare host to the full integration
//! prefix.  Whatever comes in, the client talks to `<scheme>://host/.../api`.

/// Normalize a configured base URL to its canonical `…/api` form.
pub fn normalize_base_url(input: &str) -> String {
    let mut base = input.trim().trim_end_matches('/').to_owned();

    if let Some(stripped) = base.strip_suffix("/api/integrations/openclaw") {
        base = stripped.to_owned();
    } else if let Some(stripped) = base.strip_suffix("/api") {
        base = stripped.to_owned();
    }

    format!("{base}/api")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_api() {
        assert_eq!(
            normalize_base_url("https://kanban.example"),
            "https://kanban.example/api"
        );
    }

    #[test]
    fn trailing_slash_ignored() {
        assert_eq!(
            normalize_base_url("https://kanban.example/"),
            "https://kanban.example/api"
        );
    }

    #[test]
    fn existing_api_suffix_kept_single() {
        assert_eq!(
            normalize_base_url("https://kanban.example/api"),
            "https://kanban.example/api"
        );
    }

    #[test]
    fn integration_prefix_stripped() {
        assert_eq!(
            normalize_base_url("https://kanban.example/api/integrations/openclaw"),
            "https://kanban.example/api"
        );
        assert_eq!(
            normalize_base_url("https://kanban.example/api/integrations/openclaw/"),
            "https://kanban.example/api"
        );
    }

    #[test]
    fn nested_path_preserved() {
        assert_eq!(
            normalize_base_url("https://kanban.example/tools/sk/api"),
            "https://kanban.example/tools/sk/api"
        );
    }
}
