// tests/config.rs
use signal_digest::config::{
    AppConfig, ConfigError, GenerationConfig, ENV_CONFIG_PATH, ENV_FETCH_TIMEOUT_MS,
    ENV_INGEST_CONCURRENCY, ENV_TIMEZONE,
};
use std::{env, fs};

fn clear_env() {
    for key in [
        ENV_CONFIG_PATH,
        ENV_TIMEZONE,
        ENV_INGEST_CONCURRENCY,
        ENV_FETCH_TIMEOUT_MS,
    ] {
        env::remove_var(key);
    }
}

#[test]
fn toml_and_json_files_parse_to_the_same_config() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("digest.toml");
    fs::write(
        &p_toml,
        r#"
timezone = "Europe/Prague"
default_window_days = 3
default_role = "engineering"

[[sources]]
id = "eng"
feed_url = "https://blog.test/feed.xml"
display_name = "Eng blog"
"#,
    )
    .unwrap();

    let p_json = dir.path().join("digest.json");
    fs::write(
        &p_json,
        r#"{
  "timezone": "Europe/Prague",
  "default_window_days": 3,
  "default_role": "engineering",
  "sources": [
    { "id": "eng", "feed_url": "https://blog.test/feed.xml", "display_name": "Eng blog" }
  ]
}"#,
    )
    .unwrap();

    let t = AppConfig::load_from(&p_toml).unwrap();
    let j = AppConfig::load_from(&p_json).unwrap();
    assert_eq!(t, j);
    assert_eq!(t.sources()[0].id, "eng");
    assert_eq!(t.digest_settings().unwrap().default_window.days(), 3);
}

#[test]
fn parse_errors_name_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("broken.toml");
    fs::write(&p, "timezone = [").unwrap();
    let err = AppConfig::load_from(&p).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("broken.toml"));
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    clear_env();
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    // 1) nothing on disk: defaults
    let cfg = AppConfig::load_default().unwrap();
    assert_eq!(cfg, AppConfig::default());

    // 2) json fallback
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("digest.json"), r#"{"timezone":"Asia/Tokyo"}"#).unwrap();
    assert_eq!(AppConfig::load_default().unwrap().timezone, "Asia/Tokyo");

    // 3) toml wins over json
    fs::write(cfg_dir.join("digest.toml"), r#"timezone = "Europe/Berlin""#).unwrap();
    assert_eq!(AppConfig::load_default().unwrap().timezone, "Europe/Berlin");

    // 4) explicit path wins over both
    let p_env = tmp.path().join("custom.json");
    fs::write(&p_env, r#"{"timezone":"America/Chicago"}"#).unwrap();
    env::set_var(ENV_CONFIG_PATH, &p_env);
    assert_eq!(AppConfig::load_default().unwrap().timezone, "America/Chicago");

    // 5) explicit path that does not exist is an error, not a silent fallback
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml"));
    assert!(matches!(
        AppConfig::load_default(),
        Err(ConfigError::MissingFile(_))
    ));

    clear_env();
    env::set_current_dir(old).unwrap();
}

#[serial_test::serial]
#[test]
fn env_overrides_apply_after_file() {
    clear_env();
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    env::set_var(ENV_TIMEZONE, "Asia/Kolkata");
    env::set_var(ENV_INGEST_CONCURRENCY, "6");
    env::set_var(ENV_FETCH_TIMEOUT_MS, "2500");
    let cfg = AppConfig::load_default().unwrap();
    assert_eq!(cfg.timezone, "Asia/Kolkata");
    assert_eq!(cfg.ingest_concurrency, 6);
    assert_eq!(cfg.pool_settings().fetch_timeout.as_millis(), 2500);

    env::set_var(ENV_INGEST_CONCURRENCY, "many");
    assert!(matches!(
        AppConfig::load_default(),
        Err(ConfigError::Invalid(_))
    ));

    env::set_var(ENV_INGEST_CONCURRENCY, "4");
    env::set_var(ENV_TIMEZONE, "Atlantis/Capital");
    assert!(matches!(
        AppConfig::load_default(),
        Err(ConfigError::Invalid(_))
    ));

    clear_env();
    env::set_current_dir(old).unwrap();
}

#[serial_test::serial]
#[test]
fn api_key_env_sentinel_reads_openai_key() {
    env::remove_var("OPENAI_API_KEY");
    let cfg = GenerationConfig {
        enabled: true,
        ..Default::default()
    };
    assert!(matches!(
        cfg.resolve_api_key(),
        Err(ConfigError::MissingApiKey(_))
    ));
    // misconfigured generation degrades instead of failing startup
    assert_eq!(cfg.build_generator().name(), "disabled");

    env::set_var("OPENAI_API_KEY", "sk-from-env");
    assert_eq!(cfg.resolve_api_key().unwrap(), "sk-from-env");
    assert_eq!(cfg.build_generator().name(), "openai");
    env::remove_var("OPENAI_API_KEY");
}
