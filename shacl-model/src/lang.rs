//! BCP-47 basic language-range matching for sh:languageIn
//!
//! Implements RFC 4647 "basic filtering": a range matches a tag when they
//! are equal (case-insensitively) or the tag starts with the range followed
//! by `-`. The wildcard range `*` matches any tagged literal.

/// Does `range` match `tag` under basic filtering?
pub fn language_range_matches(range: &str, tag: &str) -> bool {
    if range == "*" {
        return !tag.is_empty();
    }
    if range.len() > tag.len() {
        return false;
    }
    let head = &tag[..range.len()];
    if !head.eq_ignore_ascii_case(range) {
        return false;
    }
    tag.len() == range.len() || tag.as_bytes()[range.len()] == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_case_insensitive() {
        assert!(language_range_matches("en", "en"));
        assert!(language_range_matches("EN", "en"));
        assert!(language_range_matches("en", "EN"));
    }

    #[test]
    fn prefix_match_requires_subtag_boundary() {
        assert!(language_range_matches("en", "en-GB"));
        assert!(language_range_matches("en-gb", "en-GB"));
        assert!(!language_range_matches("en", "eng"));
        assert!(!language_range_matches("en-GB", "en"));
    }

    #[test]
    fn wildcard_matches_any_tag() {
        assert!(language_range_matches("*", "no"));
        assert!(!language_range_matches("*", ""));
    }
}
