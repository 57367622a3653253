//! Minimal RSS item extraction
//!
//! Flattens each `<item>` of a feed into a map of qualified element name
//! to text, which is all the torrent feeds we consume need. Namespaced
//! extensions (e.g. `nyaa:infoHash`) keep their prefix as part of the key.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct RssItem {
    fields: HashMap<String, String>,
}

impl RssItem {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Parse the `<item>` entries of an RSS document. Malformed XML yields
/// whatever items were complete before the error.
pub fn parse_items(xml: &str) -> Vec<RssItem> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<RssItem> = None;
    let mut element: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                if name == "item" {
                    current = Some(RssItem::default());
                } else if current.is_some() {
                    element = Some(name);
                }
            }
            Ok(Event::End(end)) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                if name == "item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                }
                element = None;
            }
            Ok(Event::Text(text)) => {
                if let (Some(item), Some(element)) = (current.as_mut(), element.as_ref()) {
                    if let Ok(text) = text.unescape() {
                        item.fields
                            .entry(element.clone())
                            .or_insert_with(|| text.trim().to_string());
                    }
                }
            }
            Ok(Event::CData(cdata)) => {
                if let (Some(item), Some(element)) = (current.as_mut(), element.as_ref()) {
                    let text = String::from_utf8_lossy(cdata.as_ref()).into_owned();
                    item.fields
                        .entry(element.clone())
                        .or_insert_with(|| text.trim().to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    items
}
