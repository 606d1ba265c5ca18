pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

pub fn truncate_to_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn sentence_prefix(text: &str, max_chars: usize) -> Option<&str> {
    let clipped = truncate_to_chars(text, max_chars);
    let mut cut = None;
    for (idx, ch) in clipped.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            let end = idx + ch.len_utf8();
            let at_boundary = match text[end..].chars().next() {
                None => true,
                Some(next) => next.is_whitespace(),
            };
            if at_boundary {
                cut = Some(end);
            }
        }
    }
    cut.map(|end| &clipped[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_to_chars("héllo", 2), "hé");
        assert_eq!(truncate_to_chars("short", 10), "short");
        assert_eq!(truncate_to_chars("abc", 0), "");
    }

    #[test]
    fn sentence_prefix_cuts_at_last_full_sentence() {
        let text = "The incision was closed. The patient was extubated. Vital signs stable";
        let prefix = sentence_prefix(text, 40).unwrap();
        assert_eq!(prefix, "The incision was closed.");
    }

    #[test]
    fn sentence_prefix_keeps_whole_text_when_it_fits() {
        let text = "Hemostasis was achieved.";
        assert_eq!(sentence_prefix(text, 100), Some(text));
    }

    #[test]
    fn sentence_prefix_ignores_decimal_points() {
        let text = "Estimated blood loss was 2.5 mL overall. Sponge count correct";
        let prefix = sentence_prefix(text, 45).unwrap();
        assert_eq!(prefix, "Estimated blood loss was 2.5 mL overall.");
    }

    #[test]
    fn sentence_prefix_without_boundary_is_none() {
        assert_eq!(sentence_prefix("no punctuation here at all", 15), None);
        assert_eq!(sentence_prefix("clause one. clause two", 5), None);
    }
}
