use normref::config::*;
use normref::types::RenderMode;
use tempfile::TempDir;

#[test]
fn test_defaults() {
    let config = ResolverConfig::default();
    assert!((config.confidence_threshold - 0.6).abs() < f64::EPSILON);
    assert_eq!(config.max_depth, 3);
    assert_eq!(config.widen_window, 300);
    assert_eq!(config.call_timeout().as_secs(), 10);
    assert!(config.resolve_ambiguous);
    assert_eq!(config.render_mode, RenderMode::Footnote);
    assert!(!config.annotate_all_occurrences);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_config_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let loaded = load_config(dir.path()).unwrap();
    assert_eq!(loaded, ResolverConfig::default());
}

#[test]
fn test_save_and_load_config() {
    let dir = TempDir::new().unwrap();
    let config = ResolverConfig {
        max_depth: 5,
        render_mode: RenderMode::Inline,
        ..ResolverConfig::default()
    };
    save_config(dir.path(), &config).unwrap();
    assert!(get_config_path(dir.path()).exists());
    assert!(!get_config_path(dir.path()).with_extension("tmp").exists());

    let loaded = load_config(dir.path()).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_normref_dir() {
    let dir = TempDir::new().unwrap();
    assert!(get_normref_dir(dir.path()).ends_with(".normref"));
}

#[test]
fn test_partial_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("resolver.toml");
    std::fs::write(
        &path,
        "max_depth = 1\nrender_mode = \"none\"\nresolve_ambiguous = false\n",
    )
    .unwrap();

    let config = load_config_file(&path).unwrap();
    assert_eq!(config.max_depth, 1);
    assert_eq!(config.render_mode, RenderMode::None);
    assert!(!config.resolve_ambiguous);
    assert_eq!(config.widen_window, 300);
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"confidence_threshold": 1.5}"#).unwrap();
    assert!(load_config_file(&path).is_err());

    let zero_rate = ResolverConfig {
        requests_per_second: 0.0,
        ..ResolverConfig::default()
    };
    assert!(zero_rate.validate().is_err());
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = load_config_file(&path).unwrap_err();
    assert!(err.to_string().starts_with("config error"));
}

#[test]
fn test_unschedulable_rate_is_rejected() {
    let tiny = ResolverConfig {
        requests_per_second: 1e-20,
        ..ResolverConfig::default()
    };
    let err = tiny.validate().unwrap_err();
    assert!(err.to_string().contains("too small"));

    let nan = ResolverConfig {
        requests_per_second: f64::NAN,
        ..ResolverConfig::default()
    };
    assert!(nan.validate().is_err());

    let slow = ResolverConfig {
        requests_per_second: 0.01,
        ..ResolverConfig::default()
    };
    assert!(slow.validate().is_ok());
}
