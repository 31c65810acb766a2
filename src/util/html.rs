use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("br regex"));
static RE_P_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<p(?:\s[^>]*)?>").expect("p open regex"));
static RE_P_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</p\s*>").expect("p close regex"));
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("blank run regex"));
static RE_IMG_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("img regex"));
static RE_WP_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-150x150|-300x\d+").expect("size suffix regex"));

/// Entities that survive XML unescaping in feed HTML and are worth decoding.
const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&#160;", " "),
    ("&#8216;", "'"),
    ("&#8217;", "'"),
    ("&lsquo;", "'"),
    ("&rsquo;", "'"),
    ("&#039;", "'"),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&#8220;", "\""),
    ("&#8221;", "\""),
    ("&ldquo;", "\""),
    ("&rdquo;", "\""),
];

/// Convert article HTML to plain text.
///
/// `<br>` becomes a newline and each paragraph starts after a blank line.
/// Remaining tags are dropped, common quote and space entities are decoded,
/// runs of blank lines collapse to a single blank line and the result is
/// trimmed.
pub fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let text = RE_BR.replace_all(html, "\n");
    let text = RE_P_OPEN.replace_all(&text, "\n\n");
    let text = RE_P_CLOSE.replace_all(&text, "");
    let text = RE_TAGS.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = RE_BLANK_RUN.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Remove every tag, leaving text and entities untouched.
pub fn strip_tags(html: &str) -> Cow<'_, str> {
    RE_TAGS.replace_all(html, "")
}

pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut out = text.to_string();
    for (entity, replacement) in ENTITIES {
        if out.contains(entity) {
            out = out.replace(entity, replacement);
        }
    }
    Cow::Owned(out)
}

/// `src` of the first `<img>` in `html`.
pub fn first_img_src(html: &str) -> Option<&str> {
    RE_IMG_SRC
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Drop a WordPress thumbnail suffix (`-150x150`, `-300x200`, ...) so the URL
/// points at the full-size upload.
pub fn strip_wp_size_suffix(url: &str) -> Cow<'_, str> {
    RE_WP_SIZE.replace(url, "")
}

/// WordPress excerpt as plain text: tags removed, the `[&hellip;]` marker
/// turned into `...`, trimmed.
pub fn clean_excerpt(rendered: &str) -> String {
    strip_tags(rendered)
        .replacen("[&hellip;]", "...", 1)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_html_to_text_paragraphs_and_breaks() {
        let html = "<p>First line<br/>second line</p><p class=\"x\">Next paragraph</p>";
        assert_eq!(
            html_to_text(html),
            "First line\nsecond line\n\nNext paragraph"
        );
    }

    #[test]
    fn test_html_to_text_decodes_entities() {
        let html = "<p>It&#8217;s&nbsp;a &#8220;test&#8221;</p>";
        assert_eq!(html_to_text(html), "It's a \"test\"");
    }

    #[test]
    fn test_html_to_text_collapses_blank_runs() {
        let html = "<p>One</p>\n\n\n\n<p>Two</p>";
        assert_eq!(html_to_text(html), "One\n\nTwo");
    }

    #[test]
    fn test_html_to_text_keeps_pre_tags_from_becoming_paragraphs() {
        assert_eq!(html_to_text("a<pre>b</pre>"), "ab");
    }

    #[test]
    fn test_html_to_text_empty() {
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn test_first_img_src() {
        let html = r#"<p>text <img class="a" src="https://x/y-300x200.jpg"> <img src='https://x/z.jpg'></p>"#;
        assert_eq!(first_img_src(html), Some("https://x/y-300x200.jpg"));
        assert_eq!(first_img_src("<p>no image</p>"), None);
    }

    #[test]
    fn test_strip_wp_size_suffix() {
        assert_eq!(strip_wp_size_suffix("https://x/y-300x200.jpg"), "https://x/y.jpg");
        assert_eq!(strip_wp_size_suffix("https://x/y-150x150.png"), "https://x/y.png");
        assert_eq!(strip_wp_size_suffix("https://x/y-1024x768.jpg"), "https://x/y-1024x768.jpg");
    }

    #[test]
    fn test_clean_excerpt() {
        let rendered = "<p>Kuching council meets today [&hellip;]</p>\n";
        assert_eq!(clean_excerpt(rendered), "Kuching council meets today ...");
    }

    proptest! {
        #[test]
        fn prop_plain_text_passes_through(s in "[a-zA-Z0-9 ,.]{0,64}") {
            prop_assert_eq!(html_to_text(&s), s.trim());
        }

        #[test]
        fn prop_no_triple_newlines(s in "(<p>|</p>|<br>|\n|[a-z ]{1,8}){0,24}") {
            let out = html_to_text(&s);
            prop_assert!(!out.contains("\n\n\n"));
            prop_assert_eq!(out.trim(), out.as_str());
        }
    }
}
