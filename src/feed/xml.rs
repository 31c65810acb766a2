//! RSS 2.0 / Atom normalizer.
//!
//! The document is read into a small element tree that keeps attributes
//! apart from element text, then each `item` (or Atom `entry`) is mapped to
//! an [`Article`] with plain-text content.

use quick_xml::escape::unescape_with;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ParseError;
use crate::sources::Source;
use crate::storage::Article;
use crate::util::{first_img_src, html_to_text, strip_wp_size_suffix};

/// Full-content fields first, then summaries.
const CONTENT_FIELDS: &[&str] = &["content:encoded", "description", "content", "summary"];
const DATE_FIELDS: &[&str] = &["pubDate", "updated", "published", "dc:date"];
const GUID_FIELDS: &[&str] = &["guid", "id"];

// ============================================================================
// Element Tree
// ============================================================================

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

/// What an element holds once attributes are set aside.
enum Value<'a> {
    Text(&'a str),
    /// Has child elements, e.g. inline XHTML.
    Structured,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn value(&self) -> Value<'_> {
        if self.children.is_empty() {
            Value::Text(self.text.trim())
        } else {
            Value::Structured
        }
    }

    /// Trimmed text of a leaf element; `None` when empty or structured.
    fn text(&self) -> Option<&str> {
        match self.value() {
            Value::Text(t) if !t.is_empty() => Some(t),
            _ => None,
        }
    }

    /// Text of the first of `names` that is present with a non-empty leaf value.
    fn first_text(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|n| self.child(n))
            .find_map(Element::text)
    }
}

fn open_element(start: &BytesStart<'_>) -> Element {
    let attrs = start
        .attributes()
        .filter_map(Result::ok)
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = match a.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
            };
            (key, value)
        })
        .collect();

    Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attrs,
        ..Element::default()
    }
}

/// HTML named entities that show up in feeds but are not defined in XML.
fn resolve_html_entity(name: &str) -> Option<&'static str> {
    match name {
        "nbsp" => Some(" "),
        "hellip" => Some("\u{2026}"),
        "ndash" => Some("\u{2013}"),
        "mdash" => Some("\u{2014}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "ldquo" => Some("\u{201C}"),
        "rdquo" => Some("\u{201D}"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

fn decode_text(raw: &[u8]) -> String {
    let raw = String::from_utf8_lossy(raw);
    match unescape_with(&raw, resolve_html_entity) {
        Ok(text) => text.into_owned(),
        Err(_) => decode_each_reference(&raw),
    }
}

/// Decode references one at a time; any that can't be resolved stay literal.
fn decode_each_reference(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match candidate.find(';') {
            Some(end) => {
                let reference = &candidate[..=end];
                match unescape_with(reference, resolve_html_entity) {
                    Ok(text) => out.push_str(&text),
                    Err(_) => out.push_str(reference),
                }
                rest = &candidate[end + 1..];
            }
            None => {
                out.push_str(candidate);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse `xml` into a tree under a synthetic, unnamed root.
fn parse_tree(xml: &str) -> Result<Element, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![Element::default()];

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ParseError::Xml(format!("at byte {}: {e}", reader.buffer_position())))?;

        match event {
            Event::Start(start) => stack.push(open_element(&start)),
            Event::Empty(start) => {
                let element = open_element(&start);
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(ParseError::Xml("unbalanced closing tag".to_string()));
                }
                if let Some(element) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    }
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&decode_text(&text));
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(ParseError::Xml("document ended inside an element".to_string()));
    }
    stack
        .pop()
        .ok_or_else(|| ParseError::Xml("empty document".to_string()))
}

// ============================================================================
// Normalization
// ============================================================================

/// Normalize an RSS or Atom payload into articles for `source`.
///
/// `rss/channel/item`, `rss/channel/entry` and `feed/entry` are all accepted.
/// A well-formed document with no items (or no channel at all) yields an
/// empty list; the caller decides whether that counts as a failure.
pub fn normalize_xml(payload: &str, source: &Source) -> Result<Vec<Article>, ParseError> {
    let root = parse_tree(payload)?;

    let channel = root
        .child("rss")
        .and_then(|rss| rss.child("channel"))
        .or_else(|| root.child("feed"));
    let Some(channel) = channel else {
        tracing::debug!(source = %source.id, "Document has no RSS channel or Atom feed");
        return Ok(Vec::new());
    };

    let mut items: Vec<&Element> = channel.children_named("item").collect();
    if items.is_empty() {
        items = channel.children_named("entry").collect();
    }

    Ok(items
        .into_iter()
        .enumerate()
        .map(|(index, item)| normalize_item(item, index, source))
        .collect())
}

fn normalize_item(item: &Element, index: usize, source: &Source) -> Article {
    let raw_content = resolve_content(item);

    Article {
        id: item
            .first_text(GUID_FIELDS)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", source.id, index)),
        headline: item
            .first_text(&["title"])
            .unwrap_or("Untitled")
            .to_string(),
        description: None,
        image_url: resolve_image(item, raw_content, source),
        content: html_to_text(raw_content),
        date: item.first_text(DATE_FIELDS).map(str::to_string),
        source: source.name.clone(),
        url: resolve_link(item),
        verified: false,
    }
}

/// Raw HTML content. The first non-empty content field wins; if that field
/// is a structured fragment rather than text the content is empty.
fn resolve_content(item: &Element) -> &str {
    for name in CONTENT_FIELDS {
        let Some(field) = item.child(name) else {
            continue;
        };
        match field.value() {
            Value::Structured => return "",
            Value::Text(t) if !t.is_empty() => return t,
            Value::Text(_) => {}
        }
    }
    ""
}

fn resolve_image(item: &Element, raw_content: &str, source: &Source) -> String {
    let media = item.child("media:content").and_then(|m| m.attr("url"));
    let enclosure = || {
        item.child("enclosure").and_then(|e| {
            let is_image = e.attr("type").is_some_and(|t| t.starts_with("image"));
            e.attr("url").filter(|_| is_image)
        })
    };

    let mut image = media
        .or_else(enclosure)
        .unwrap_or(source.placeholder_image.as_str());

    if !is_placeholder_image(image, source) {
        return image.to_string();
    }

    if let Some(src) = first_img_src(raw_content) {
        image = src;
    }
    strip_wp_size_suffix(image).into_owned()
}

/// True for the source's own placeholder and for generic logo/default images.
fn is_placeholder_image(url: &str, source: &Source) -> bool {
    let placeholder_file = source
        .placeholder_image
        .rsplit('/')
        .next()
        .filter(|f| !f.is_empty());

    url == source.placeholder_image
        || placeholder_file.is_some_and(|f| url.contains(f))
        || url.to_lowercase().contains("logo")
        || url.contains("default")
}

/// RSS `<link>` text, or an Atom `<link href>` that is the alternate link.
fn resolve_link(item: &Element) -> Option<String> {
    item.children_named("link").find_map(|link| {
        link.text().map(str::to_string).or_else(|| {
            let rel = link.attr("rel").unwrap_or("alternate");
            (rel == "alternate")
                .then(|| link.attr("href").map(str::to_string))
                .flatten()
        })
    })
}
