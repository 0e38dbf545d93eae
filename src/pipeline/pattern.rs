//! Placeholder expansion for `body contains` phrases.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};

static QUOTED_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'([^']+)'").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const WORD: &str = "[a-zA-Z]+";

/// Turn a prompt phrase into a body regex.
///
/// Applied in order:
/// 1. each single-quoted token inside the phrase becomes `[a-zA-Z]+`,
///    everything else is escaped and matched literally
/// 2. each whitespace run becomes `\s+`
/// 3. the literal `\s+city` becomes `\s+[a-zA-Z]*`
///
/// Callers strip quotes that wrap the whole phrase before calling this.
pub fn placeholder_pattern(phrase: &str) -> String {
    let mut pattern = String::with_capacity(phrase.len() + 16);
    let mut last = 0;
    for token in QUOTED_TOKEN.find_iter(phrase) {
        pattern.push_str(&regex::escape(&phrase[last..token.start()]));
        pattern.push_str(WORD);
        last = token.end();
    }
    pattern.push_str(&regex::escape(&phrase[last..]));

    let pattern = WHITESPACE.replace_all(&pattern, NoExpand(r"\s+"));
    pattern.replace(r"\s+city", r"\s+[a-zA-Z]*")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(phrase: &str) -> Regex {
        Regex::new(&format!("(?i){}", placeholder_pattern(phrase))).unwrap()
    }

    #[test]
    fn quoted_placeholders() {
        assert_eq!(
            placeholder_pattern("i am 'xyz' from 'abc' city"),
            r"i\s+am\s+[a-zA-Z]+\s+from\s+[a-zA-Z]+\s+[a-zA-Z]*"
        );
    }

    #[test]
    fn unquoted_words_match_literally() {
        let re = matcher("java developer");
        assert!(re.is_match("applying for the Java  Developer role"));
        assert!(!re.is_match("hello, please find my resume"));
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(placeholder_pattern("c++ (senior)"), r"c\+\+\s+\(senior\)");
        let re = matcher("c++ developer");
        assert!(re.is_match("experienced c++ developer"));
        assert!(!re.is_match("ccc developer"));
    }

    #[test]
    fn expanded_pattern_matches_real_text() {
        let re = matcher("I am 'XYZ' from 'ABC' city");
        assert!(re.is_match("hello, i am john from chicago"));
        assert!(!re.is_match("hello there"));
    }

    #[test]
    fn plain_text_only_gets_whitespace_rewrite() {
        assert_eq!(placeholder_pattern("hi  there"), r"hi\s+there");
        assert_eq!(placeholder_pattern("city"), "city");
    }
}
