//! Canonical external-ID forms.
//!
//! Exactly three shapes exist, colon-separated:
//!   `project:<projectKey>`
//!   `workitem:<projectKey>:<workItemKey>`
//!   `task:<projectKey>:<workItemKey>:<taskKey>`
//!
//! Bare (non-colonized) inputs are promoted into the canonical form using the
//! ambient parent keys.  A colonized input that disagrees with the declared
//! parents fails — mismatches must never survive canonicalization.

use sk_domain::{Error, Result};

/// Canonicalize a project external ID.  Accepts either a bare project key or
/// an already-canonical `project:<key>`.
pub fn canonicalize_project_external_id(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::InvalidExternalId("empty project id".into()));
    }

    match input.split_once(':') {
        None => {
            check_key(input, "project key")?;
            Ok(format!("project:{input}"))
        }
        Some(("project", key)) => {
            check_key(key, "project key")?;
            Ok(format!("project:{key}"))
        }
        Some(_) => Err(Error::InvalidExternalId(format!(
            "not a project external id: {input}"
        ))),
    }
}

/// Canonicalize a work-item external ID under the given project key.
pub fn canonicalize_work_item_external_id(input: &str, project_key: &str) -> Result<String> {
    let input = input.trim();
    check_key(project_key, "project key")?;
    if input.is_empty() {
        return Err(Error::InvalidExternalId("empty work-item id".into()));
    }

    if !input.contains(':') {
        check_key(input, "work-item key")?;
        return Ok(format!("workitem:{project_key}:{input}"));
    }

    let mut parts = input.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("workitem"), Some(p), Some(w), None) => {
            if p != project_key {
                return Err(Error::InvalidExternalId(format!(
                    "work-item belongs to project {p}, expected {project_key}"
                )));
            }
            check_key(w, "work-item key")?;
            Ok(format!("workitem:{project_key}:{w}"))
        }
        _ => Err(Error::InvalidExternalId(format!(
            "not a work-item external id: {input}"
        ))),
    }
}

/// Canonicalize a task external ID under the given project and work-item keys.
pub fn canonicalize_task_external_id(
    input: &str,
    project_key: &str,
    work_item_key: &str,
) -> Result<String> {
    let input = input.trim();
    check_key(project_key, "project key")?;
    check_key(work_item_key, "work-item key")?;
    if input.is_empty() {
        return Err(Error::InvalidExternalId("empty task id".into()));
    }

    if !input.contains(':') {
        check_key(input, "task key")?;
        return Ok(format!("task:{project_key}:{work_item_key}:{input}"));
    }

    let mut parts = input.split(':');
    match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some("task"), Some(p), Some(w), Some(t), None) => {
            if p != project_key || w != work_item_key {
                return Err(Error::InvalidExternalId(format!(
                    "task belongs to {p}:{w}, expected {project_key}:{work_item_key}"
                )));
            }
            check_key(t, "task key")?;
            Ok(format!("task:{project_key}:{work_item_key}:{t}"))
        }
        _ => Err(Error::InvalidExternalId(format!(
            "not a task external id: {input}"
        ))),
    }
}

/// The last key segment of a canonical external ID (used to default display
/// names when the caller supplies none).
pub fn leaf_key(external_id: &str) -> &str {
    external_id.rsplit(':').next().unwrap_or(external_id)
}

fn check_key(key: &str, what: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidExternalId(format!("empty {what}")));
    }
    if key.contains(':') {
        return Err(Error::InvalidExternalId(format!(
            "{what} may not contain ':': {key}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_project_key_promoted() {
        assert_eq!(
            canonicalize_project_external_id("alpha").unwrap(),
            "project:alpha"
        );
    }

    #[test]
    fn canonical_project_passes_through() {
        assert_eq!(
            canonicalize_project_external_id("project:alpha").unwrap(),
            "project:alpha"
        );
    }

    #[test]
    fn foreign_prefix_rejected() {
        assert!(canonicalize_project_external_id("task:a:b:c").is_err());
    }

    #[test]
    fn bare_work_item_promoted_under_project() {
        assert_eq!(
            canonicalize_work_item_external_id("w1", "alpha").unwrap(),
            "workitem:alpha:w1"
        );
    }

    #[test]
    fn work_item_project_mismatch_fails() {
        let err = canonicalize_work_item_external_id("workitem:beta:w1", "alpha").unwrap_err();
        assert!(matches!(err, Error::InvalidExternalId(_)));
    }

    #[test]
    fn work_item_matching_parent_accepted() {
        assert_eq!(
            canonicalize_work_item_external_id("workitem:alpha:w1", "alpha").unwrap(),
            "workitem:alpha:w1"
        );
    }

    #[test]
    fn colonized_non_matching_shape_fails() {
        // Has a colon but is not `workitem:<project>:<key>`.
        assert!(canonicalize_work_item_external_id("workitem:alpha", "alpha").is_err());
        assert!(canonicalize_work_item_external_id("workitem:alpha:w1:extra", "alpha").is_err());
    }

    #[test]
    fn bare_task_promoted_under_parents() {
        assert_eq!(
            canonicalize_task_external_id("t1", "alpha", "w1").unwrap(),
            "task:alpha:w1:t1"
        );
    }

    #[test]
    fn task_parent_mismatch_fails() {
        assert!(canonicalize_task_external_id("task:alpha:w2:t1", "alpha", "w1").is_err());
        assert!(canonicalize_task_external_id("task:beta:w1:t1", "alpha", "w1").is_err());
    }

    #[test]
    fn key_with_colon_rejected() {
        assert!(canonicalize_project_external_id("project:a:b").is_err());
    }

    #[test]
    fn leaf_key_extraction() {
        assert_eq!(leaf_key("task:alpha:w1:t1"), "t1");
        assert_eq!(leaf_key("bare"), "bare");
    }
}
