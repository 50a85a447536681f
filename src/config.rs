// src/config.rs
//! # Relay configuration
//!
//! One immutable [`RelayConfig`] is built at startup and handed to every
//! component (wrapped in `Arc` by the pipeline). Nothing reads the
//! environment after this point.
//!
//! Lookup order for the file:
//! 1) `$RELAY_CONFIG_PATH`
//! 2) `config/relay.toml`
//! 3) `config/relay.json`
//!
//! `RELAY_BOT_TOKEN` overrides `destination.bot_token` so the secret can live
//! in `.env` instead of the config file.

use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RelayError, Result};

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const ENV_BOT_TOKEN: &str = "RELAY_BOT_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Upstream source ids, e.g. `["city_news", "traffic_ru"]`.
    pub sources: Vec<String>,
    /// Directory holding `<source>.jsonl` spool files for the pull source.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Wall-clock budget for one pull pass over all sources.
    #[serde(default = "default_run_budget_secs")]
    pub run_budget_secs: u64,
    #[serde(default = "default_max_items_per_pass")]
    pub max_items_per_pass: usize,
    #[serde(default = "default_fingerprint_ttl_hours")]
    pub fingerprint_ttl_hours: u64,
    /// Content-level dedup switch.
    #[serde(default = "default_true")]
    pub dedup_text: bool,
    /// Catch-up suppression on first contact with a source.
    #[serde(default = "default_true")]
    pub start_from_now: bool,
    #[serde(default = "default_pacing_delay_secs")]
    pub pacing_delay_secs: u64,
    /// Extra attempts for transient publish failures (throttles don't count).
    #[serde(default = "default_publish_retries")]
    pub publish_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// e.g. `"127.0.0.1:9185"`; Prometheus listener stays off when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub rewrite: RewriteConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    Telegram,
    /// Dry run: log what would be published.
    #[default]
    Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    #[serde(default)]
    pub kind: DestinationKind,
    /// Target chat, e.g. `@my_channel` or `-100123456789`.
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            kind: DestinationKind::default(),
            chat_id: String::new(),
            bot_token: None,
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReorderMode {
    /// Always swap the first two chosen sentences.
    #[default]
    Swap,
    /// Let the input hash decide which pair gets swapped.
    Hashed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub max_text_chars: usize,
    pub max_caption_chars: usize,
    /// K: how many ranked sentences to keep.
    pub sentences: usize,
    /// Sentences at or under this many chars get the brevity bonus.
    pub short_sentence_chars: usize,
    /// Empty list disables the lead phrase.
    pub lead_phrases: Vec<String>,
    pub lead_skip_words: Vec<String>,
    /// Case-insensitive regex; lines/sentences matching it are dropped.
    pub promo_pattern: String,
    pub substitute: bool,
    /// phrase → candidate replacements.
    pub substitutions: BTreeMap<String, Vec<String>>,
    pub reorder: ReorderMode,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 900,
            max_caption_chars: 900,
            sentences: 3,
            short_sentence_chars: 160,
            lead_phrases: vec!["Коротко:".to_string()],
            lead_skip_words: vec!["коротко".to_string(), "обновление".to_string()],
            promo_pattern: default_promo_pattern(),
            substitute: true,
            substitutions: default_substitutions(),
            reorder: ReorderMode::default(),
        }
    }
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from("state/spool")
}
fn default_state_path() -> PathBuf {
    PathBuf::from("state/relay_state.json")
}
fn default_poll_interval_secs() -> u64 {
    15
}
fn default_run_budget_secs() -> u64 {
    60
}
fn default_max_items_per_pass() -> usize {
    100
}
fn default_fingerprint_ttl_hours() -> u64 {
    72
}
fn default_true() -> bool {
    true
}
fn default_pacing_delay_secs() -> u64 {
    15
}
fn default_publish_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

pub fn default_promo_pattern() -> String {
    r"(?i)(подпис|подпиш|репост|реклама|конкурс|розыгрыш|promo|скидк|subscribe|giveaway)".to_string()
}

pub fn default_substitutions() -> BTreeMap<String, Vec<String>> {
    let mut m = BTreeMap::new();
    for (phrase, alts) in [
        ("стало известно", &["появилась информация"][..]),
        ("сообщается", &["по данным на сейчас", "по имеющимся данным"][..]),
        ("в настоящее время", &["сейчас"][..]),
        ("на данный момент", &["сейчас", "пока"][..]),
        ("по предварительным данным", &["предварительно"][..]),
        ("в ближайшее время", &["в скором времени", "скоро"][..]),
        ("проводится проверка", &["идёт проверка"][..]),
        ("произошло", &["случилось"][..]),
        ("появились подробности", &["стали известны детали"][..]),
    ] {
        m.insert(
            phrase.to_string(),
            alts.iter().map(|s| s.to_string()).collect(),
        );
    }
    m
}

impl RelayConfig {
    /// Defaults for everything except the source list; destination is the
    /// dry-run logger.
    pub fn with_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            spool_dir: default_spool_dir(),
            state_path: default_state_path(),
            poll_interval_secs: default_poll_interval_secs(),
            run_budget_secs: default_run_budget_secs(),
            max_items_per_pass: default_max_items_per_pass(),
            fingerprint_ttl_hours: default_fingerprint_ttl_hours(),
            dedup_text: true,
            start_from_now: true,
            pacing_delay_secs: default_pacing_delay_secs(),
            publish_retries: default_publish_retries(),
            retry_base_ms: default_retry_base_ms(),
            metrics_addr: None,
            destination: DestinationConfig::default(),
            rewrite: RewriteConfig::default(),
        }
    }

    /// Load from an explicit path. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading relay config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing relay config {}", path.display()))?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load using env var + fallbacks (see module docs).
    pub fn load_default() -> anyhow::Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in ["config/relay.toml", "config/relay.json"] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Err(anyhow!(
            "no relay config found (set {ENV_CONFIG_PATH} or create config/relay.toml)"
        ))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(ENV_BOT_TOKEN) {
            let token = token.trim();
            if !token.is_empty() {
                self.destination.bot_token = Some(token.to_string());
            }
        }
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(config_err("at least one source is required"));
        }
        let mut seen = HashSet::new();
        for s in &self.sources {
            if s.trim().is_empty() {
                return Err(config_err("source ids must be non-empty"));
            }
            if !seen.insert(s.as_str()) {
                return Err(config_err(format!("duplicate source id `{s}`")));
            }
        }
        if self.destination.kind == DestinationKind::Telegram {
            if self.destination.chat_id.trim().is_empty() {
                return Err(config_err("destination.chat_id is required"));
            }
            if self
                .destination
                .bot_token
                .as_deref()
                .map_or(true, |t| t.trim().is_empty())
            {
                return Err(config_err(format!(
                    "destination.bot_token (or {ENV_BOT_TOKEN}) is required"
                )));
            }
        }
        let rw = &self.rewrite;
        if rw.sentences == 0 {
            return Err(config_err("rewrite.sentences must be >= 1"));
        }
        if rw.max_text_chars == 0 || rw.max_caption_chars == 0 {
            return Err(config_err("rewrite max lengths must be >= 1"));
        }
        if let Err(e) = regex::Regex::new(&rw.promo_pattern) {
            return Err(config_err(format!("rewrite.promo_pattern: {e}")));
        }
        for (phrase, alts) in &rw.substitutions {
            if phrase.trim().is_empty() {
                return Err(config_err("substitution phrases must be non-empty"));
            }
            if alts.is_empty() {
                return Err(config_err(format!(
                    "substitution `{phrase}` has no replacement"
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn run_budget(&self) -> Duration {
        Duration::from_secs(self.run_budget_secs)
    }

    pub fn fingerprint_ttl(&self) -> Duration {
        Duration::from_secs(self.fingerprint_ttl_hours.saturating_mul(3600))
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_secs(self.pacing_delay_secs)
    }
}

fn config_err(msg: impl Into<String>) -> RelayError {
    RelayError::Configuration(msg.into())
}

fn parse_config(s: &str, hint_ext: &str) -> anyhow::Result<RelayConfig> {
    // TOML first when hinted; JSON otherwise; then the other one as fallback.
    if hint_ext == "json" {
        return match serde_json::from_str(s) {
            Ok(v) => Ok(v),
            Err(json_err) => toml::from_str(s).map_err(|_| anyhow!(json_err)),
        };
    }
    match toml::from_str(s) {
        Ok(v) => Ok(v),
        Err(toml_err) => serde_json::from_str(s).map_err(|_| anyhow!(toml_err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_with_defaults() {
        let cfg = parse_config(
            r#"
sources = ["a", "b"]
pacing_delay_secs = 2

[rewrite]
sentences = 2
lead_phrases = ["Кратко:", "Главное:"]
"#,
            "toml",
        )
        .unwrap();
        assert_eq!(cfg.sources, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cfg.pacing_delay_secs, 2);
        assert_eq!(cfg.poll_interval_secs, 15);
        assert_eq!(cfg.rewrite.sentences, 2);
        assert_eq!(cfg.rewrite.max_caption_chars, 900);
        assert_eq!(cfg.rewrite.lead_phrases.len(), 2);
        assert!(cfg.dedup_text);
        assert_eq!(cfg.destination.kind, DestinationKind::Log);
        cfg.validate().unwrap();
    }

    #[test]
    fn json_is_accepted() {
        let cfg = parse_config(
            r#"{"sources":["x"],"destination":{"kind":"telegram","chat_id":"@dst","bot_token":"t"}}"#,
            "json",
        )
        .unwrap();
        assert_eq!(cfg.destination.kind, DestinationKind::Telegram);
        cfg.validate().unwrap();
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let mut cfg = RelayConfig::with_sources(Vec::<String>::new());
        assert!(matches!(cfg.validate(), Err(RelayError::Configuration(_))));

        cfg.sources = vec!["a".into(), "a".into()];
        assert!(cfg.validate().is_err());

        cfg.sources = vec!["a".into()];
        cfg.destination.kind = DestinationKind::Telegram;
        assert!(cfg.validate().is_err(), "telegram needs a chat id");

        cfg.destination.kind = DestinationKind::Log;
        cfg.rewrite.promo_pattern = "(unclosed".into();
        assert!(cfg.validate().is_err());

        cfg.rewrite.promo_pattern = default_promo_pattern();
        cfg.rewrite.max_text_chars = 0;
        assert!(cfg.validate().is_err());
    }
}
