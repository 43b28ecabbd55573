use sk_domain::config::{Config, ConfigSeverity, RedactionMode};

#[test]
fn default_exporter_ticks() {
    let config = Config::default();
    assert_eq!(config.exporter.poll_interval_ms, 1_000);
    assert_eq!(config.exporter.sender_interval_ms, 250);
    assert_eq!(config.exporter.debounce_ms, 250);
    assert_eq!(config.exporter.max_lines_per_tick, 200);
    assert!(!config.exporter.backfill);
}

#[test]
fn default_redaction_caps() {
    let config = Config::default();
    assert_eq!(config.redaction.mode, RedactionMode::Tools);
    assert_eq!(config.redaction.max_message_chars, 8_000);
    assert_eq!(config.redaction.max_tool_input_chars, 4_000);
    assert_eq!(config.redaction.max_tool_output_chars, 8_000);
}

#[test]
fn poll_interval_floor_applies() {
    let toml_str = r#"
[exporter]
poll_interval_ms = 50
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.exporter.poll_interval_ms, 50);
    assert_eq!(config.exporter.effective_poll_interval_ms(), 250);
}

#[test]
fn timeout_floor_applies() {
    let toml_str = r#"
[super_kanban]
base_url = "https://kanban.example/api"
timeout_ms = 100
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.super_kanban.effective_timeout_ms(), 500);
}

#[test]
fn lock_ttl_floor_applies() {
    let toml_str = r#"
[controller]
task_lock_ttl_seconds = 5
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.controller.effective_lock_ttl_seconds(), 60);
}

#[test]
fn validate_flags_missing_credentials() {
    let mut config = Config::default();
    config.super_kanban.base_url = "https://kanban.example".into();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|e| e.field == "super_kanban" && e.severity == ConfigSeverity::Error));
}

#[test]
fn validate_accepts_complete_config() {
    let mut config = Config::default();
    config.super_kanban.base_url = "https://kanban.example".into();
    config.super_kanban.api_key = Some("k".into());
    let errors: Vec<_> = config
        .validate()
        .into_iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .collect();
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn agent_allowlist_empty_allows_all() {
    let config = Config::default();
    assert!(config.exporter.agent_allowed("anything"));
}

#[test]
fn agent_allowlist_filters() {
    let toml_str = r#"
[exporter]
agent_allowlist = ["work"]
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(config.exporter.agent_allowed("work"));
    assert!(!config.exporter.agent_allowed("personal"));
}

#[test]
fn state_paths_derive_from_plugin_id() {
    let toml_str = r#"
[state]
dir = "/srv/openclaw"
plugin_id = "super-kanban"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(
        config.state.meta_path().to_string_lossy(),
        "/srv/openclaw/plugins/super-kanban/meta.json"
    );
    assert_eq!(
        config.state.spool_path().to_string_lossy(),
        "/srv/openclaw/plugins/super-kanban/spool.jsonl"
    );
    assert_eq!(
        config.state.label_map_path().to_string_lossy(),
        "/srv/openclaw/Exports/label-map.json"
    );
}
