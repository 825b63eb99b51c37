use feed_rs::parser;
use tracing::debug;

use crate::types::{FetchError, FetchedEntry, FetchedFeed};

/// Parse raw RSS/Atom bytes into a normalized feed. A document that is not
/// a feed at all is a permanent failure; individual malformed items are
/// skipped and counted instead of aborting.
pub fn parse_feed(content: &str) -> Result<FetchedFeed, FetchError> {
    let feed = parser::parse(content.as_bytes())
        .map_err(|e| FetchError::permanent(format!("unparseable feed: {}", e)))?;

    let title = feed.title.map(|t| t.content);
    let site_url = feed
        .links
        .iter()
        .find(|l| l.rel.as_deref() != Some("self"))
        .or_else(|| feed.links.first())
        .map(|l| l.href.clone());

    let mut entries = Vec::new();
    let mut skipped = 0;

    for item in feed.entries {
        match normalize_entry(item) {
            Some(entry) => entries.push(entry),
            None => skipped += 1,
        }
    }

    debug!(entries = entries.len(), skipped, "parsed feed");

    Ok(FetchedFeed {
        title,
        site_url,
        entries,
        skipped,
    })
}

/// An item with neither an id nor a link has no usable identity and is
/// dropped.
fn normalize_entry(item: feed_rs::model::Entry) -> Option<FetchedEntry> {
    let permalink = item.links.first().map(|l| l.href.clone());

    let guid = if !item.id.is_empty() {
        item.id.clone()
    } else {
        match &permalink {
            Some(link) => link.clone(),
            None => {
                debug!("skipping item without id or link");
                return None;
            }
        }
    };

    let title = item
        .title
        .map(|t| t.content)
        .unwrap_or_else(|| "Untitled".to_string());

    let summary = item.summary.map(|s| s.content);

    // Prefer the full content body, fall back to the summary.
    let content = match &item.content {
        Some(body) => body.body.clone().or_else(|| summary.clone()),
        None => summary.clone(),
    };

    let author = item.authors.first().map(|a| a.name.clone());

    let categories = item.categories.into_iter().map(|c| c.term).collect();

    Some(FetchedEntry {
        guid,
        permalink,
        title,
        summary,
        content,
        author,
        published_at: item.published,
        updated_at: item.updated,
        categories,
    })
}
