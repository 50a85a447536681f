// src/rewrite/mod.rs
//! # Extractive Rewriter
//! Deterministic clean → strip noise → substitute → split → score → select →
//! reorder → compose → clamp pipeline. Same input text, same output, always.
//!
//! This is a summarization heuristic, not a paraphraser: it only picks,
//! reorders and lightly substitutes phrases that are already in the text.

pub mod clamp;
pub mod noise;
pub mod sentences;
pub mod variation;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{ReorderMode, RewriteConfig};
use crate::error::{RelayError, Result};

pub use clamp::{clamp, ELLIPSIS};
pub use noise::{clean, strip_noise};
pub use sentences::split_sentences;
pub use variation::Variation;

static RE_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").expect("static regex"));

// Currency signs anywhere; unit / address words as whole tokens; dotted
// address abbreviations followed by anything.
static RE_UNIT_OR_PLACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[₽$€£]|(?:^|[^\p{L}\p{N}_])(?:руб\p{L}*|км|м|час\p{L}*|мин\p{L}*|дом|№|km|mi|miles?|hours?|hrs?|mins?|minutes?|street|road|avenue|usd|eur)(?:$|[^\p{L}\p{N}_])|(?:^|[^\p{L}\p{N}_])(?:ул|просп|пр|пер|пл|наб|д|st|ave|rd)\.",
    )
    .expect("static regex")
});

static RE_RELATIVE_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[^\p{L}])(?:сегодня|вчера|завтра|утром|днём|днем|вечером|ночью|today|yesterday|tomorrow|tonight|this morning|this evening)(?:$|[^\p{L}])",
    )
    .expect("static regex")
});

static RE_NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("static regex"));

/// Minimum number of sentences the fallback tries to reach.
const MIN_CHOSEN: usize = 2;

/// Sentence weight: digits +3, unit/place +2, relative day +1, brevity +1.
pub fn score_sentence(sentence: &str, short_chars: usize) -> u32 {
    let mut score = 0;
    if RE_DIGIT.is_match(sentence) {
        score += 3;
    }
    if RE_UNIT_OR_PLACE.is_match(sentence) {
        score += 2;
    }
    if RE_RELATIVE_DAY.is_match(sentence) {
        score += 1;
    }
    if sentence.chars().count() <= short_chars {
        score += 1;
    }
    score
}

/// Punctuation-free lowercase form used for near-duplicate suppression.
fn sentence_key(sentence: &str) -> String {
    RE_NON_WORD.replace_all(&sentence.to_lowercase(), "").into_owned()
}

struct Substitution {
    pattern: Regex,
    alternatives: Vec<String>,
}

pub struct Rewriter {
    cfg: RewriteConfig,
    promo: Regex,
    substitutions: Vec<Substitution>,
    lead_prefixes: Vec<String>,
}

impl Rewriter {
    pub fn new(cfg: &RewriteConfig) -> Result<Self> {
        let promo = Regex::new(&cfg.promo_pattern)
            .map_err(|e| RelayError::Configuration(format!("promo pattern: {e}")))?;

        // Longest phrases first so "в настоящее время" wins over any shorter overlap.
        let mut phrases: Vec<(&String, &Vec<String>)> = cfg.substitutions.iter().collect();
        phrases.sort_by(|a, b| {
            b.0.chars()
                .count()
                .cmp(&a.0.chars().count())
                .then_with(|| a.0.cmp(b.0))
        });
        let mut substitutions = Vec::with_capacity(phrases.len());
        for (phrase, alts) in phrases {
            if alts.is_empty() {
                continue;
            }
            let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase.trim())))
                .map_err(|e| RelayError::Configuration(format!("substitution `{phrase}`: {e}")))?;
            substitutions.push(Substitution {
                pattern,
                alternatives: alts.clone(),
            });
        }

        let lead_prefixes = cfg
            .lead_phrases
            .iter()
            .chain(cfg.lead_skip_words.iter())
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            cfg: cfg.clone(),
            promo,
            substitutions,
            lead_prefixes,
        })
    }

    pub fn promo(&self) -> &Regex {
        &self.promo
    }

    /// Rewrite and clamp to the caption budget when media is attached, the
    /// text budget otherwise.
    pub fn render(&self, text: &str, with_media: bool) -> String {
        let budget = if with_media {
            self.cfg.max_caption_chars
        } else {
            self.cfg.max_text_chars
        };
        clamp(&self.rewrite(text), budget)
    }

    /// Full rewrite without the final clamp. Empty when nothing survives.
    pub fn rewrite(&self, text: &str) -> String {
        let mut var = Variation::from_text(text);

        // 1) + 2) clean and strip noise
        let stripped = strip_noise(text, &self.promo);
        if stripped.is_empty() {
            return String::new();
        }

        // 3) phrase substitution
        let substituted = if self.cfg.substitute {
            self.substitute(&stripped, &mut var)
        } else {
            stripped
        };

        // 4) split
        let sents = split_sentences(&substituted);
        if sents.is_empty() {
            return String::new();
        }

        // 5) + 6) score and select
        let mut chosen = self.select(&sents);

        // 7) reorder
        self.reorder(&mut chosen, &mut var);

        // 8) compose
        let body = chosen.join(" ");
        let out = self.with_lead(body, &mut var);
        clean(&out)
    }

    fn substitute(&self, text: &str, var: &mut Variation) -> String {
        let mut out = text.to_string();
        for sub in &self.substitutions {
            if !sub.pattern.is_match(&out) {
                continue;
            }
            out = sub
                .pattern
                .replace_all(&out, |caps: &regex::Captures<'_>| {
                    let alt = &sub.alternatives[var.pick(sub.alternatives.len())];
                    match_case(&caps[0], alt)
                })
                .into_owned();
        }
        out
    }

    fn select(&self, sents: &[String]) -> Vec<String> {
        let k = self.cfg.sentences.max(1);
        let mut ranked: Vec<(usize, u32)> = sents
            .iter()
            .enumerate()
            .map(|(i, s)| (i, score_sentence(s, self.cfg.short_sentence_chars)))
            .collect();
        // stable: ties keep original order
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let mut picked: Vec<usize> = Vec::with_capacity(k);
        let mut keys: Vec<String> = Vec::with_capacity(k);
        for (idx, _) in ranked {
            let key = sentence_key(&sents[idx]);
            if keys.contains(&key) {
                continue;
            }
            keys.push(key);
            picked.push(idx);
            if picked.len() >= k {
                break;
            }
        }

        if picked.len() < MIN_CHOSEN {
            for (idx, s) in sents.iter().enumerate() {
                if picked.len() >= MIN_CHOSEN {
                    break;
                }
                let key = sentence_key(s);
                if picked.contains(&idx) || keys.contains(&key) {
                    continue;
                }
                keys.push(key);
                picked.push(idx);
            }
        }

        picked.into_iter().map(|i| sents[i].clone()).collect()
    }

    fn reorder(&self, chosen: &mut [String], var: &mut Variation) {
        if chosen.len() < 2 {
            return;
        }
        match self.cfg.reorder {
            ReorderMode::Swap => chosen.swap(0, 1),
            ReorderMode::Hashed => {
                let i = var.pick(chosen.len() - 1);
                chosen.swap(i, i + 1);
            }
        }
    }

    fn with_lead(&self, body: String, var: &mut Variation) -> String {
        if body.is_empty() || self.cfg.lead_phrases.is_empty() {
            return body;
        }
        let lower = body.to_lowercase();
        if self.lead_prefixes.iter().any(|p| lower.starts_with(p.as_str())) {
            return body;
        }
        let lead = self.cfg.lead_phrases[var.pick(self.cfg.lead_phrases.len())].trim();
        if lead.is_empty() {
            return body;
        }
        format!("{lead} {body}")
    }
}

/// Carry the capitalisation of the matched phrase's first letter over to
/// the replacement.
fn match_case(matched: &str, replacement: &str) -> String {
    let starts_upper = matched.chars().next().is_some_and(char::is_uppercase);
    if !starts_upper {
        return replacement.to_string();
    }
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RewriteConfig;

    fn rewriter() -> Rewriter {
        Rewriter::new(&RewriteConfig::default()).unwrap()
    }

    #[test]
    fn scoring_weights() {
        assert_eq!(score_sentence("В 10:00 перекроют мост.", 160), 3 + 1);
        assert_eq!(score_sentence("ДТП на ул. Ленина.", 160), 2 + 1);
        assert_eq!(score_sentence("Сегодня будет дождь.", 160), 1 + 1);
        assert_eq!(score_sentence("Цена 500 руб за билет сегодня.", 160), 3 + 2 + 1 + 1);
        assert_eq!(score_sentence("Ничего особенного.", 5), 0);
    }

    #[test]
    fn promotional_sentence_removed_and_lead_added() {
        let out = rewriter()
            .rewrite("Стало известно о ДТП на ул. Ленина. Пострадавших нет. Подпишись на канал!");
        assert!(out.starts_with("Коротко: "), "{out}");
        assert!(!out.to_lowercase().contains("подпиш"), "{out}");
        assert!(out.contains("Появилась информация о ДТП на ул. Ленина."), "{out}");
        assert_eq!(
            out,
            "Коротко: Пострадавших нет. Появилась информация о ДТП на ул. Ленина."
        );
    }

    #[test]
    fn ranking_prefers_digits_and_limits_to_k() {
        let mut cfg = RewriteConfig::default();
        cfg.sentences = 2;
        cfg.lead_phrases.clear();
        let rw = Rewriter::new(&cfg).unwrap();
        let out = rw.rewrite(
            "Жители обеспокоены ситуацией. В 14:30 на ул. Мира загорелся дом. Причины выясняют. Ущерб 2 млн руб.",
        );
        // ranks: "В 14:30..." (3+2+1) then "Ущерб 2 млн руб." (3+2+1); swapped
        assert_eq!(out, "Ущерб 2 млн руб. В 14:30 на ул. Мира загорелся дом.");
    }

    #[test]
    fn near_duplicates_are_suppressed() {
        let mut cfg = RewriteConfig::default();
        cfg.lead_phrases.clear();
        let rw = Rewriter::new(&cfg).unwrap();
        let out = rw.rewrite("Мост закрыт! Мост закрыт. Объезд по набережной.");
        assert_eq!(out.matches("Мост закрыт").count(), 1, "{out}");
    }

    #[test]
    fn single_sentence_passes_through() {
        let mut cfg = RewriteConfig::default();
        cfg.lead_phrases.clear();
        let rw = Rewriter::new(&cfg).unwrap();
        assert_eq!(rw.rewrite("Мост закрыт на ремонт."), "Мост закрыт на ремонт.");
    }

    #[test]
    fn empty_or_pure_noise_yields_empty() {
        let rw = rewriter();
        assert_eq!(rw.rewrite(""), "");
        assert_eq!(rw.rewrite("   \n  "), "");
        assert_eq!(rw.rewrite("https://t.me/chan @someone #tag"), "");
        assert_eq!(rw.rewrite("Подпишись на канал!"), "");
    }

    #[test]
    fn lead_skipped_when_already_present() {
        let rw = rewriter();
        let out = rw.rewrite("Обновление: мост открыт.");
        assert!(!out.starts_with("Коротко:"), "{out}");
        assert!(out.starts_with("Обновление:"));
    }

    #[test]
    fn substitution_preserves_case_and_word_boundary() {
        let mut cfg = RewriteConfig::default();
        cfg.lead_phrases.clear();
        let rw = Rewriter::new(&cfg).unwrap();
        assert_eq!(rw.rewrite("Произошло замыкание."), "Случилось замыкание.");
        // "произошлого" is not the phrase "произошло"
        assert_eq!(rw.rewrite("Итоги произошлого."), "Итоги произошлого.");
    }

    #[test]
    fn substitution_disabled() {
        let mut cfg = RewriteConfig::default();
        cfg.lead_phrases.clear();
        cfg.substitute = false;
        let rw = Rewriter::new(&cfg).unwrap();
        assert_eq!(rw.rewrite("Произошло замыкание."), "Произошло замыкание.");
    }

    #[test]
    fn deterministic_with_multiple_choices() {
        let mut cfg = RewriteConfig::default();
        cfg.lead_phrases = vec!["Коротко:".into(), "Главное:".into(), "Кратко:".into()];
        cfg.reorder = ReorderMode::Hashed;
        let text = "Сообщается, что на данный момент движение закрыто. В 9:00 откроют полосу. \
                    В ближайшее время появятся объезды. Пробка 5 км.";
        let a = Rewriter::new(&cfg).unwrap();
        let b = Rewriter::new(&cfg).unwrap();
        let first = a.rewrite(text);
        for _ in 0..5 {
            assert_eq!(a.rewrite(text), first);
            assert_eq!(b.rewrite(text), first);
        }
        assert!(!first.is_empty());
    }

    #[test]
    fn render_clamps_by_budget() {
        let mut cfg = RewriteConfig::default();
        cfg.max_text_chars = 30;
        cfg.max_caption_chars = 20;
        let rw = Rewriter::new(&cfg).unwrap();
        let text = "В 10:00 на ул. Ленина перекроют движение. Объезд по ул. Мира до 18:00.";
        let as_text = rw.render(text, false);
        let as_caption = rw.render(text, true);
        assert!(as_text.chars().count() <= 30);
        assert!(as_caption.chars().count() <= 20);
        assert!(as_caption.ends_with(ELLIPSIS));
    }
}
