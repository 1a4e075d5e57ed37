use chrono::{DateTime, Utc};
use feed_rs::model::{FeedType, Link};
use feed_rs::parser;
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::{Error, Result};

/// Channel-level data from an RSS document
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub items: Vec<ParsedItem>,
}

/// One `<item>` of a channel. RSS makes every field optional.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ParsedItem {
    /// Title for display, falling back to the link when the item has none
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.link.as_deref())
            .unwrap_or("(untitled)")
    }
}

/// Parse an RSS document.
///
/// The document must be well-formed XML. Channel title and description are
/// HTML-entity decoded. Item fields keep their entities and markup; the only
/// normalisation applied to them is trimming of surrounding whitespace.
/// Atom and JSON feeds are rejected.
pub fn parse_feed(content: &[u8]) -> Result<ParsedFeed> {
    ensure_well_formed(content)?;

    let feed = parser::parse(content).map_err(|e| Error::ParseFailed(e.to_string()))?;

    match feed.feed_type {
        FeedType::RSS0 | FeedType::RSS1 | FeedType::RSS2 => {}
        other => {
            return Err(Error::ParseFailed(format!(
                "expected an RSS document, found {:?}",
                other
            )))
        }
    }

    let title = feed
        .title
        .map(|t| decode_entities(&t.content))
        .unwrap_or_default();
    let description = feed.description.map(|d| decode_entities(&d.content));
    let link = site_link(&feed.links);

    let items = feed
        .entries
        .into_iter()
        .map(|entry| ParsedItem {
            title: entry.title.map(|t| t.content),
            link: entry.links.first().map(|l| l.href.clone()),
            description: entry.summary.map(|s| s.content),
            published_at: entry.published,
        })
        .collect();

    Ok(ParsedFeed {
        title,
        link,
        description,
        items,
    })
}

/// Walk the whole document once; mismatched or stray end tags fail here
fn ensure_well_formed(content: &[u8]) -> Result<()> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().check_end_names = true;

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(e) => {
                return Err(Error::ParseFailed(format!(
                    "malformed XML at byte {}: {}",
                    reader.error_position(),
                    e
                )))
            }
        }
    }
}

// Channels often carry an atom:link rel="self" next to the site link
fn site_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref() != Some("self"))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}

/// Decode HTML entities, leaving the text untouched if it holds a stray `&`
fn decode_entities(text: &str) -> String {
    match unescape_with(text, resolve_html5_entity) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
<channel>
    <title><![CDATA[Lane&#39;s Blog &amp; Notes]]></title>
    <link>https://blog.example.com/</link>
    <atom:link href="https://blog.example.com/index.xml" rel="self" type="application/rss+xml"/>
    <description><![CDATA[Thoughts on &quot;software&quot;]]></description>
    <item>
        <title><![CDATA[Fish &amp; Chips]]></title>
        <link>https://blog.example.com/fish</link>
        <description>First post</description>
        <pubDate>Mon, 02 Jan 2023 15:04:05 +0000</pubDate>
    </item>
    <item>
        <link>https://blog.example.com/untitled</link>
    </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_channel_fields() {
        let parsed = parse_feed(SAMPLE_RSS.as_bytes()).unwrap();

        assert_eq!(parsed.title, "Lane's Blog & Notes");
        assert_eq!(parsed.description.as_deref(), Some("Thoughts on \"software\""));
        assert_eq!(parsed.link.as_deref(), Some("https://blog.example.com/"));
        assert_eq!(parsed.items.len(), 2);
    }

    #[test]
    fn test_item_fields_pass_through() {
        let parsed = parse_feed(SAMPLE_RSS.as_bytes()).unwrap();
        let first = &parsed.items[0];

        assert_eq!(first.title.as_deref(), Some("Fish &amp; Chips"));
        assert_eq!(first.link.as_deref(), Some("https://blog.example.com/fish"));
        assert_eq!(first.description.as_deref(), Some("First post"));
        assert_eq!(
            first.published_at,
            Some(Utc.with_ymd_and_hms(2023, 1, 2, 15, 4, 5).unwrap())
        );
    }

    #[test]
    fn test_missing_item_fields_are_absent() {
        let parsed = parse_feed(SAMPLE_RSS.as_bytes()).unwrap();
        let second = &parsed.items[1];

        assert!(second.title.is_none());
        assert!(second.published_at.is_none());
        assert_eq!(second.display_title(), "https://blog.example.com/untitled");
    }

    #[test]
    fn test_not_xml_is_parse_failure() {
        let err = parse_feed(b"this is not a feed").unwrap_err();
        assert!(matches!(err, Error::ParseFailed(_)));
    }

    #[test]
    fn test_mismatched_tags_are_parse_failure() {
        let mismatched = br#"<rss version="2.0"><channel><title>T</title><item><title>A</foo></item></channel></rss>"#;

        let err = parse_feed(mismatched).unwrap_err();
        assert!(matches!(err, Error::ParseFailed(ref msg) if msg.contains("malformed XML")));
    }

    #[test]
    fn test_item_whitespace_is_trimmed() {
        let rss = r#"<rss version="2.0"><channel><title>T</title>
    <item><title>  Fish &amp; Chips  </title></item>
</channel></rss>"#;

        let parsed = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(parsed.items[0].title.as_deref(), Some("Fish & Chips"));
    }

    #[test]
    fn test_atom_is_rejected() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom Feed</title>
    <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
    <updated>2023-01-02T15:04:05Z</updated>
</feed>"#;

        let err = parse_feed(atom.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::ParseFailed(ref msg) if msg.contains("Atom")));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry&nbsp;&#8217;"), "Tom & Jerry\u{a0}\u{2019}");
        assert_eq!(decode_entities("AT&T"), "AT&T");
    }
}
