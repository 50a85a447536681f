// src/rewrite/sentences.rs
use once_cell::sync::Lazy;
use regex::Regex;

/// Terminal punctuation run followed by whitespace.
static RE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?…]+\s+").expect("static regex"));

/// Fragments shorter than this (in chars) are noise, not sentences.
pub const MIN_SENTENCE_CHARS: usize = 3;

/// Lowercased tokens after which a period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "ул", "пр", "просп", "пер", "пл", "наб", "д", "г", "гг", "им", "т", "тыс", "млн", "млрд",
    "руб", "коп", "см", "стр", "обл", "р-н", "мр", "т.е", "т.к", "т.д", "т.п", "mr", "mrs",
    "ms", "dr", "st", "ave", "vs", "no", "e.g", "i.e", "jr", "sr",
];

fn is_abbreviation(token: &str) -> bool {
    let token = token.trim_start_matches(|c: char| !c.is_alphanumeric());
    if token.is_empty() {
        return false;
    }
    let lower = token.to_lowercase();
    // single-letter initials: "А. С. Пушкин"
    if lower.chars().count() == 1 && lower.chars().all(char::is_alphabetic) {
        return true;
    }
    ABBREVIATIONS.contains(&lower.as_str())
}

/// Split on sentence-terminal punctuation followed by whitespace, keeping the
/// punctuation with its sentence. Abbreviations and initials do not split.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0usize;

    for m in RE_BOUNDARY.find_iter(text) {
        let punct = m.as_str().trim_end();
        let punct_end = m.start() + punct.len();

        if punct == "." {
            let before = &text[start..m.start()];
            let last_token = before.rsplit(char::is_whitespace).next().unwrap_or("");
            if is_abbreviation(last_token) {
                continue;
            }
        }

        push_fragment(&mut out, &text[start..punct_end]);
        start = m.end();
    }
    push_fragment(&mut out, &text[start..]);
    out
}

fn push_fragment(out: &mut Vec<String>, fragment: &str) {
    let f = fragment.trim();
    if f.chars().count() >= MIN_SENTENCE_CHARS {
        out.push(f.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let s = split_sentences("Первое. Второе! Третье? Четвёртое");
        assert_eq!(s, vec!["Первое.", "Второе!", "Третье?", "Четвёртое"]);
    }

    #[test]
    fn keeps_abbreviations_and_initials_together() {
        let s = split_sentences("ДТП на ул. Ленина, д. 5. Водитель А. С. Иванов задержан.");
        assert_eq!(
            s,
            vec!["ДТП на ул. Ленина, д. 5.", "Водитель А. С. Иванов задержан."]
        );
    }

    #[test]
    fn drops_short_fragments() {
        let s = split_sentences("1! 2? Это нормальное предложение.");
        assert_eq!(s, vec!["Это нормальное предложение."]);
    }

    #[test]
    fn no_split_without_whitespace() {
        assert_eq!(split_sentences("3.14 is pi"), vec!["3.14 is pi"]);
        assert!(split_sentences("").is_empty());
    }
}
