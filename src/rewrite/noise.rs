// src/rewrite/noise.rs
//! Cleaning and noise stripping shared by the rewriter and the fingerprint
//! normalizer.

use once_cell::sync::Lazy;
use regex::Regex;

use super::sentences::split_sentences;

static RE_MANY_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex"));
static RE_HSPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").expect("static regex"));
static RE_DEEP_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:(?:https?://)?(?:t\.me|telegram\.me)/\S+|tg://\S+)").expect("static regex")
});
static RE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:https?://|www\.)\S+").expect("static regex"));
static RE_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\w+").expect("static regex"));
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\w+").expect("static regex"));
static RE_SPACE_BEFORE_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+([,.!?;:])").expect("static regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("static regex"));

const ZERO_WIDTH: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// Trim, drop zero-width chars, cap blank-line runs at one, collapse
/// spaces/tabs.
pub fn clean(text: &str) -> String {
    let t = text.trim();
    if t.is_empty() {
        return String::new();
    }
    let t: String = t.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect();
    let t = RE_MANY_NEWLINES.replace_all(&t, "\n\n");
    let t = RE_HSPACE.replace_all(&t, " ");
    t.trim().to_string()
}

/// Remove links, mentions, tags and promotional content; returns one line.
///
/// Promotional filtering works per sentence inside each line: a line that is
/// entirely promotional disappears, a line that merely ends with a call to
/// subscribe keeps its informative sentences.
pub fn strip_noise(text: &str, promo: &Regex) -> String {
    let t = clean(text);
    if t.is_empty() {
        return String::new();
    }

    // 1) links, mentions, tags
    let t = RE_DEEP_LINK.replace_all(&t, "");
    let t = RE_URL.replace_all(&t, "");
    let t = RE_MENTION.replace_all(&t, "");
    let t = RE_TAG.replace_all(&t, "");

    // 2) promotional lines / sentences
    let mut kept: Vec<String> = Vec::new();
    for line in t.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !promo.is_match(line) {
            kept.push(line.to_string());
            continue;
        }
        let survivors: Vec<String> = split_sentences(line)
            .into_iter()
            .filter(|s| !promo.is_match(s))
            .collect();
        if !survivors.is_empty() {
            kept.push(survivors.join(" "));
        }
    }

    // 3) rejoin and tidy punctuation spacing
    let joined = kept.join(" ");
    let joined = RE_SPACE_BEFORE_PUNCT.replace_all(&joined, "$1");
    let joined = RE_WS.replace_all(&joined, " ");
    joined.trim().to_string()
}
