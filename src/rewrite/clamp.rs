// src/rewrite/clamp.rs

/// Appended when text had to be cut.
pub const ELLIPSIS: char = '…';

fn is_word_break(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | ';' | ':' | '!' | '?' | ')' | '»')
}

/// Truncate to at most `max_chars` characters (ellipsis included), cutting at
/// the last whole-word boundary. Text already within budget is returned as is.
///
/// A budget of zero yields an empty string.
pub fn clamp(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let budget = max_chars - 1;
    let cut = text
        .char_indices()
        .nth(budget)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..cut];
    let next_is_break = text[cut..].chars().next().map_or(true, is_word_break);

    let kept = if next_is_break {
        head
    } else {
        match head.rfind(char::is_whitespace) {
            Some(i) => &head[..i],
            // one giant word: nothing fits without splitting it
            None => "",
        }
    };
    let kept = kept.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'));

    let mut out = String::with_capacity(kept.len() + ELLIPSIS.len_utf8());
    out.push_str(kept);
    out.push(ELLIPSIS);
    out
}
