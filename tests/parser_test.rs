use planet_aggregator::parser::parse_feed;

const RSS_DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example Planet</title>
    <link>https://example.com/</link>
    <description>test channel</description>
    <item>
      <title>First post</title>
      <link>https://example.com/first</link>
      <guid>tag:example.com,2026:first</guid>
      <description>first summary</description>
      <pubDate>Mon, 06 Jul 2026 10:00:00 GMT</pubDate>
      <category>rust</category>
    </item>
    <item>
      <title>Second post</title>
      <link>https://example.com/second</link>
      <guid>tag:example.com,2026:second</guid>
      <content:encoded>full second body</content:encoded>
    </item>
  </channel>
</rss>"#;

const ATOM_DOC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <link href="https://example.org/"/>
  <link rel="self" href="https://example.org/feed.xml"/>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <updated>2026-07-06T10:00:00Z</updated>
  <entry>
    <title>Hello</title>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <link href="https://example.org/hello"/>
    <updated>2026-07-06T10:00:00Z</updated>
    <summary>short</summary>
    <content type="text">full body</content>
    <author><name>Bob</name></author>
  </entry>
</feed>"#;

#[test]
fn parses_rss_channel_into_normalized_entries() {
    let feed = parse_feed(RSS_DOC).expect("valid RSS parses");

    assert_eq!(feed.title.as_deref(), Some("Example Planet"));
    assert_eq!(feed.site_url.as_deref(), Some("https://example.com/"));
    assert_eq!(feed.entries.len(), 2);
    assert_eq!(feed.skipped, 0);

    let first = &feed.entries[0];
    assert_eq!(first.guid, "tag:example.com,2026:first");
    assert_eq!(first.title, "First post");
    assert_eq!(first.permalink.as_deref(), Some("https://example.com/first"));
    assert_eq!(first.summary.as_deref(), Some("first summary"));
    assert!(first.published_at.is_some(), "pubDate must be parsed");
    assert_eq!(first.categories, vec!["rust".to_string()]);

    // No content body: the summary stands in.
    assert_eq!(first.content.as_deref(), Some("first summary"));

    let second = &feed.entries[1];
    assert_eq!(second.guid, "tag:example.com,2026:second");
    assert_eq!(second.content.as_deref(), Some("full second body"));
}

#[test]
fn parses_atom_and_prefers_the_non_self_link() {
    let feed = parse_feed(ATOM_DOC).expect("valid Atom parses");

    assert_eq!(feed.title.as_deref(), Some("Atom Example"));
    assert_eq!(feed.site_url.as_deref(), Some("https://example.org/"));
    assert_eq!(feed.entries.len(), 1);

    let entry = &feed.entries[0];
    assert_eq!(entry.guid, "urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a");
    assert_eq!(entry.permalink.as_deref(), Some("https://example.org/hello"));
    assert_eq!(entry.content.as_deref(), Some("full body"));
    assert_eq!(entry.author.as_deref(), Some("Bob"));
    assert!(entry.updated_at.is_some());
}

#[test]
fn a_document_that_is_not_a_feed_fails_permanently() {
    let err = parse_feed("<html><body>definitely not a feed</body></html>")
        .expect_err("non-feed must not parse");
    assert!(!err.is_transient(), "unparseable documents are permanent failures");
}
