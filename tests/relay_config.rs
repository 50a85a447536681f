// tests/relay_config.rs
use feed_relay::config::{DestinationKind, RelayConfig, ReorderMode, ENV_BOT_TOKEN, ENV_CONFIG_PATH};
use std::{env, fs};

#[test]
fn parse_toml_and_json_paths() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("relay.toml");
    fs::write(
        &p_toml,
        r#"
sources = ["city_news", "traffic"]
fingerprint_ttl_hours = 24

[destination]
kind = "log"

[rewrite]
reorder = "hashed"
"#,
    )
    .unwrap();
    let c = RelayConfig::load_from(&p_toml).unwrap();
    assert_eq!(c.sources, vec!["city_news".to_string(), "traffic".to_string()]);
    assert_eq!(c.fingerprint_ttl().as_secs(), 24 * 3600);
    assert_eq!(c.rewrite.reorder, ReorderMode::Hashed);
    c.validate().unwrap();

    let p_json = dir.path().join("relay.json");
    fs::write(&p_json, r#"{"sources": ["a"], "start_from_now": false}"#).unwrap();
    let cj = RelayConfig::load_from(&p_json).unwrap();
    assert!(!cj.start_from_now);
    assert_eq!(cj.destination.kind, DestinationKind::Log);
}

#[test]
fn unparseable_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("relay.toml");
    fs::write(&p, "sources = [").unwrap();
    assert!(RelayConfig::load_from(&p).is_err());
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // keep the real repo config/ out of the way
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var(ENV_BOT_TOKEN);

    // 1) nothing anywhere → error
    assert!(RelayConfig::load_default().is_err());

    // 2) fallback TOML in ./config/
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("relay.toml"), r#"sources = ["from_toml"]"#).unwrap();
    let c = RelayConfig::load_default().unwrap();
    assert_eq!(c.sources, vec!["from_toml".to_string()]);

    // 3) env path wins
    let p_env = tmp.path().join("custom.json");
    fs::write(
        &p_env,
        r#"{"sources": ["from_env"], "destination": {"kind": "telegram", "chat_id": "@dst"}}"#,
    )
    .unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    let c = RelayConfig::load_default().unwrap();
    assert_eq!(c.sources, vec!["from_env".to_string()]);
    assert!(c.validate().is_err(), "telegram without a token");

    // 4) token from env completes it
    env::set_var(ENV_BOT_TOKEN, "123:abc");
    let c = RelayConfig::load_default().unwrap();
    assert_eq!(c.destination.bot_token.as_deref(), Some("123:abc"));
    c.validate().unwrap();

    // 5) env path to nowhere is an error, not a silent fallback
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(RelayConfig::load_default().is_err());

    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var(ENV_BOT_TOKEN);
    env::set_current_dir(&old).unwrap();
}
