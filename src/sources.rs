//! Source list loader: JSON (`{"sources": [...]}`) or OPML
//! (`outline[@type="rss"]`), deduplicated by URL.

use std::collections::HashSet;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub url: String,
    pub description: String,
}

#[derive(Error, Debug)]
pub enum SourceListError {
    #[error("could not read source list {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("could not parse JSON source list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not parse OPML source list: {0}")]
    Opml(#[from] quick_xml::Error),
    #[error("unsupported source list extension: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Deserialize)]
struct JsonSource {
    name: String,
    url: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct JsonDocument {
    sources: Vec<JsonSource>,
}

fn parse_json(raw: &str) -> Result<Vec<Source>, SourceListError> {
    let doc: JsonDocument = serde_json::from_str(raw)?;
    Ok(doc
        .sources
        .into_iter()
        .map(|s| Source {
            name: s.name,
            url: s.url,
            description: s.description,
        })
        .collect())
}

fn parse_opml(raw: &str) -> Result<Vec<Source>, SourceListError> {
    let mut reader = Reader::from_str(raw);

    let mut sources = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(tag) | Event::Start(tag) if tag.name().as_ref() == b"outline" => {
                let mut is_rss = false;
                let mut url = None;
                let mut name = None;
                let mut description = None;
                for attr in tag.attributes().flatten() {
                    let key = attr.key.as_ref();
                    let value = attr.unescape_value().unwrap_or_default().into_owned();
                    match key {
                        b"type" if value == "rss" => is_rss = true,
                        b"xmlUrl" => url = Some(value),
                        b"text" => name = Some(value),
                        b"title" => description = Some(value),
                        _ => {}
                    }
                }
                if is_rss {
                    if let Some(url) = url {
                        sources.push(Source {
                            name: name.clone().unwrap_or_default(),
                            url,
                            description: description.unwrap_or_default(),
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sources)
}

/// Loads a source list from `path`, dispatching on extension (`.json` or
/// `.opml`/`.xml`), then deduplicating by URL (first occurrence wins).
pub fn load(path: &Path) -> Result<Vec<Source>, SourceListError> {
    let raw = std::fs::read_to_string(path).map_err(|e| SourceListError::Io(path.display().to_string(), e))?;

    let sources = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_json(&raw)?,
        Some("opml") | Some("xml") => parse_opml(&raw)?,
        other => return Err(SourceListError::UnsupportedFormat(other.unwrap_or("").to_string())),
    };

    let mut seen = HashSet::new();
    Ok(sources.into_iter().filter(|s| seen.insert(s.url.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_DOC: &str = r#"{"sources": [
        {"name": "A", "url": "https://a.test/feed", "description": "feed a"},
        {"name": "A dup", "url": "https://a.test/feed", "description": "dup"},
        {"name": "B", "url": "https://b.test/feed", "description": "feed b"}
    ]}"#;

    const OPML_DOC: &str = r#"<?xml version="1.0"?>
<opml version="2.0">
<body>
  <outline text="A" type="rss" xmlUrl="https://a.test/feed" title="feed a"/>
  <outline text="A dup" type="rss" xmlUrl="https://a.test/feed" title="dup"/>
  <outline text="Not a feed" type="link" xmlUrl="https://c.test/page"/>
</body>
</opml>"#;

    #[test]
    fn json_sources_dedup_by_url() {
        let sources = parse_json(JSON_DOC).unwrap();
        let mut seen = HashSet::new();
        let deduped: Vec<_> = sources.into_iter().filter(|s| seen.insert(s.url.clone())).collect();
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].name, "A");
    }

    #[test]
    fn opml_sources_only_include_rss_outlines() {
        let sources = parse_opml(OPML_DOC).unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources.iter().all(|s| s.url != "https://c.test/page"));
    }
}
