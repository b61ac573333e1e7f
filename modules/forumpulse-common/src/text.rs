use std::sync::LazyLock;

use regex::{Captures, Regex};

static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<pre><code>(.*?)</code></pre>").unwrap());
static P_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<p>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#x?[0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

/// Strip forum HTML down to plain text.
///
/// Fenced code blocks survive as literal text on their own lines, `<p>`
/// becomes a line break, remaining tags are stripped, entities decoded,
/// and whitespace collapsed per line. Empty lines are dropped.
pub fn clean_forum_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // Code blocks first: their contents are entity-decoded but otherwise literal.
    let with_code = CODE_BLOCK_RE.replace_all(text, |caps: &Captures| {
        format!("\n{}\n", decode_entities(&caps[1]).trim())
    });
    let with_breaks = P_TAG_RE.replace_all(&with_code, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);

    let lines: Vec<String> = decoded
        .split('\n')
        .map(|line| WHITESPACE_RE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    lines.join("\n")
}

/// Decode the HTML entities the forum emits. Single pass — `&amp;lt;`
/// becomes `&lt;`, not `<`.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32).map(String::from)
            } else {
                match body {
                    "amp" => Some("&".to_string()),
                    "lt" => Some("<".to_string()),
                    "gt" => Some(">".to_string()),
                    "quot" => Some("\"".to_string()),
                    "apos" => Some("'".to_string()),
                    "nbsp" => Some(" ".to_string()),
                    _ => None,
                }
            };
            decoded.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_decodes_entities() {
        let cleaned = clean_forum_html("I <i>really</i> like this &amp; that");
        assert_eq!(cleaned, "I really like this & that");
    }

    #[test]
    fn paragraph_tags_become_line_breaks() {
        let cleaned = clean_forum_html("first<p>second<p>third");
        assert_eq!(cleaned, "first\nsecond\nthird");
    }

    #[test]
    fn code_blocks_survive_as_literal_text() {
        let cleaned = clean_forum_html(
            "Look:<pre><code>let x = a &lt; b;</code></pre>done",
        );
        assert!(cleaned.contains("let x = a < b;"));
        assert!(cleaned.contains("done"));
    }

    #[test]
    fn collapses_whitespace_per_line() {
        let cleaned = clean_forum_html("too    many   spaces");
        assert_eq!(cleaned, "too many spaces");
    }

    #[test]
    fn hex_entities_decode() {
        assert_eq!(decode_entities("it&#x27;s &#x2F; ok &#39;y&#39;"), "it's / ok 'y'");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(clean_forum_html(""), "");
        assert_eq!(clean_forum_html("<p></p>"), "");
    }

    #[test]
    fn unknown_entity_left_intact() {
        assert_eq!(decode_entities("&bogus; &amp;"), "&bogus; &");
    }
}
