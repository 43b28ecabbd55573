//! `super-kanban doctor` — offline diagnostics.

use sk_client::{normalize_base_url, resolve_auth, AuthScope};
use sk_domain::config::{Config, ConfigSeverity};

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("super-kanban doctor");
    println!("===================\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_base_url(config, &mut all_passed);
    check_auth_scopes(config, &mut all_passed);
    check_state_dir(config, &mut all_passed);
    check_super_kanban(config, &mut all_passed).await;

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }
    Ok(all_passed)
}

// ── Individual checks ─────────────────────────────────────────────────

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults + env)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

fn check_base_url(config: &Config, all_passed: &mut bool) {
    let raw = &config.super_kanban.base_url;
    let ok = !raw.is_empty();
    print_check(
        "Super-Kanban base URL",
        ok,
        if ok {
            format!("{raw} → {}", normalize_base_url(raw))
        } else {
            "not configured".into()
        },
    );
    if !ok {
        *all_passed = false;
    }
}

fn check_auth_scopes(config: &Config, all_passed: &mut bool) {
    for (scope, name) in [(AuthScope::Read, "read"), (AuthScope::Write, "write")] {
        match resolve_auth(&config.super_kanban, scope) {
            Ok((header, _)) => {
                print_check(
                    &format!("Auth scope: {name}"),
                    true,
                    format!("via {header}"),
                );
            }
            Err(e) => {
                print_check(&format!("Auth scope: {name}"), false, e.to_string());
                *all_passed = false;
            }
        }
    }
}

fn check_state_dir(config: &Config, all_passed: &mut bool) {
    let agents = config.state.agents_dir();
    let exists = agents.exists();
    let agent_count = if exists {
        std::fs::read_dir(&agents)
            .map(|rd| rd.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()).count())
            .unwrap_or(0)
    } else {
        0
    };
    print_check(
        "State directory",
        exists,
        if exists {
            format!("{} ({agent_count} agent(s))", agents.display())
        } else {
            format!("{} (does not exist)", agents.display())
        },
    );
    if !exists {
        *all_passed = false;
    }

    let label_map = config.state.label_map_path();
    let readable = !label_map.exists() || std::fs::read_to_string(&label_map).is_ok();
    print_check(
        "Label map",
        readable,
        format!(
            "{}{}",
            label_map.display(),
            if label_map.exists() { "" } else { " (will be created)" }
        ),
    );
    if !readable {
        *all_passed = false;
    }
}

async fn check_super_kanban(config: &Config, all_passed: &mut bool) {
    if config.super_kanban.base_url.is_empty() {
        return;
    }
    let url = normalize_base_url(&config.super_kanban.base_url);
    let reachable = match reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
    {
        Ok(client) => client.get(&url).send().await.is_ok(),
        Err(_) => false,
    };
    print_check(
        "Super-Kanban reachable",
        reachable,
        if reachable {
            url
        } else {
            format!("{url} (unreachable)")
        },
    );
    if !reachable {
        *all_passed = false;
    }
}

// ── Formatting helper ─────────────────────────────────────────────────

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
