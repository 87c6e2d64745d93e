use chrono::{DateTime, Utc};
use quick_xml::escape::escape;

use crate::domain::{NotificationThread, RenderConfig, subject_type_label};

const NO_TITLE: &str = "(no title)";
const UNKNOWN_REPO: &str = "unknown/repo";
const UNREAD_MARKER: &str = "🔔";
const CHANNEL_IMAGE: &str = "https://github.githubassets.com/favicons/favicon.png";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub guid: String,
    pub pub_date: DateTime<Utc>,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub link: String,
    pub description: String,
    pub last_build_date: DateTime<Utc>,
    pub items: Vec<FeedItem>,
}

/// Build one feed item per thread, keeping the input order.
pub fn render(
    threads: &[NotificationThread],
    presentation: &RenderConfig,
    now: DateTime<Utc>,
) -> FeedDocument {
    FeedDocument {
        title: presentation.title.clone(),
        link: presentation.link.clone(),
        description: presentation.description.clone(),
        last_build_date: now,
        items: threads
            .iter()
            .map(|thread| render_item(thread, presentation))
            .collect(),
    }
}

fn render_item(thread: &NotificationThread, presentation: &RenderConfig) -> FeedItem {
    let repo = thread.repo_name().unwrap_or(UNKNOWN_REPO);
    let title = thread.title.as_deref().unwrap_or(NO_TITLE);
    let link = thread
        .html_url
        .clone()
        .unwrap_or_else(|| presentation.link.clone());

    let description = if presentation.html_description {
        html_description(thread, repo, title)
    } else {
        plain_description(thread, repo, title)
    };

    FeedItem {
        title: format!("[{repo}] {title}"),
        link,
        guid: thread.id.clone(),
        pub_date: thread.updated_at,
        description,
    }
}

fn reason_raw(thread: &NotificationThread) -> &str {
    match thread.reason.as_str() {
        "" => "unknown",
        raw => raw,
    }
}

fn reason_label(thread: &NotificationThread) -> &str {
    match thread.reason.label() {
        "" => "other",
        label => label,
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn html_description(thread: &NotificationThread, repo: &str, title: &str) -> String {
    let type_label = escape(subject_type_label(thread.subject_type.as_deref()));
    let marker = if thread.unread { UNREAD_MARKER } else { "" };
    let repo = escape(repo);

    let mut html = format!(
        "<p>\n  <strong>[{}]</strong>\n  <span>[{type_label}]</span>\n  <span>{marker}</span>\n</p>\n<p>{}</p>\n",
        escape(reason_label(thread)),
        escape(title),
    );
    html.push_str(&format!(
        "<p>\n  <strong>Repo:</strong> {repo}<br>\n  <strong>Reason:</strong> {}<br>\n  <strong>Type:</strong> {type_label}<br>\n  <strong>Unread:</strong> {}<br>\n",
        escape(reason_raw(thread)),
        yes_no(thread.unread),
    ));
    if let Some(repo_html) = repo_link(thread) {
        html.push_str(&format!(
            "  <strong>Repo link:</strong> <a href=\"{}\">{repo}</a><br>\n",
            escape(repo_html),
        ));
    }
    html.push_str(&format!(
        "  <strong>Updated:</strong> {}<br>\n</p>",
        thread.updated_at.to_rfc3339()
    ));
    html
}

fn plain_description(thread: &NotificationThread, repo: &str, title: &str) -> String {
    let type_label = subject_type_label(thread.subject_type.as_deref());
    let marker = if thread.unread {
        format!(" {UNREAD_MARKER}")
    } else {
        String::new()
    };

    let mut text = format!(
        "[{}] [{type_label}]{marker}\nTitle: {title}\nRepo: {repo}\nReason: {}\nType: {type_label}\nUnread: {}",
        reason_label(thread),
        reason_raw(thread),
        yes_no(thread.unread),
    );
    if let Some(repo_html) = repo_link(thread) {
        text.push_str(&format!("\nRepo link: {repo_html}"));
    }
    text.push_str(&format!("\nUpdated: {}", thread.updated_at.to_rfc3339()));
    text
}

fn repo_link(thread: &NotificationThread) -> Option<&str> {
    thread
        .repository
        .as_ref()
        .and_then(|repo| repo.html_url.as_deref())
}

// XML 1.0 forbids most C0 controls even when escaped.
fn is_xml_char(c: char) -> bool {
    !matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}

/// Escape text for an XML element or attribute, dropping characters XML
/// cannot carry at all.
fn xml_text(raw: &str) -> String {
    if raw.chars().all(is_xml_char) {
        return escape(raw).into_owned();
    }
    let cleaned: String = raw.chars().filter(|c| is_xml_char(*c)).collect();
    escape(cleaned.as_str()).into_owned()
}

impl FeedDocument {
    /// Serialize as an RSS 2.0 document.
    pub fn to_xml(&self) -> String {
        let title = xml_text(&self.title);
        let link = xml_text(&self.link);

        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n<channel>\n  <title>{title}</title>\n  <link>{link}</link>\n  <description>{}</description>\n  <lastBuildDate>{}</lastBuildDate>\n",
            xml_text(&self.description),
            self.last_build_date.to_rfc2822(),
        );
        xml.push_str(&format!(
            "  <image>\n    <url>{CHANNEL_IMAGE}</url>\n    <title>{title}</title>\n    <link>{link}</link>\n  </image>\n"
        ));

        for item in &self.items {
            xml.push_str(&format!(
                "  <item>\n    <title>{}</title>\n    <link>{}</link>\n    <guid isPermaLink=\"false\">{}</guid>\n    <pubDate>{}</pubDate>\n    <description>{}</description>\n  </item>\n",
                xml_text(&item.title),
                xml_text(&item.link),
                xml_text(&item.guid),
                item.pub_date.to_rfc2822(),
                xml_text(&item.description),
            ));
        }

        xml.push_str("</channel>\n</rss>\n");
        xml
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use quick_xml::{events::Event, reader::Reader};

    use super::*;
    use crate::{
        domain::{FilterConfig, Reason, Repository},
        filter,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()
    }

    fn thread(id: &str, title: Option<&str>, reason: Reason, unread: bool) -> NotificationThread {
        NotificationThread {
            id: id.into(),
            repository: Some(Repository {
                full_name: "acme/widgets".into(),
                html_url: Some("https://github.com/acme/widgets".into()),
            }),
            title: title.map(str::to_owned),
            subject_type: Some("PullRequest".into()),
            reason,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            unread,
            url: None,
            html_url: Some(format!("https://github.com/acme/widgets/pull/{id}")),
        }
    }

    /// Walk the whole document and count `<item>` elements; fails on any
    /// well-formedness error.
    fn count_items(xml: &str) -> usize {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().check_end_names = true;
        let mut items = 0;
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.name().as_ref() == b"item" => items += 1,
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => panic!("malformed feed: {err}"),
            }
        }
        items
    }

    #[test]
    fn item_title_is_repo_prefixed() {
        let doc = render(
            &[thread("7", Some("Fix parser"), Reason::Mention, true)],
            &RenderConfig::default(),
            now(),
        );
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].title, "[acme/widgets] Fix parser");
        assert_eq!(doc.items[0].guid, "7");
        assert_eq!(doc.items[0].link, "https://github.com/acme/widgets/pull/7");
    }

    #[test]
    fn missing_fields_render_with_placeholders() {
        let mut broken = thread("8", None, Reason::Other("mystery".into()), false);
        broken.repository = None;
        broken.html_url = None;
        broken.subject_type = None;

        let presentation = RenderConfig::default();
        let doc = render(&[broken], &presentation, now());
        let item = &doc.items[0];
        assert_eq!(item.title, "[unknown/repo] (no title)");
        assert_eq!(item.link, presentation.link);
        assert!(item.description.contains("[Other]"));
    }

    #[test]
    fn html_description_carries_tags_and_metadata() {
        let doc = render(
            &[thread("7", Some("Fix <parser>"), Reason::ReviewRequested, true)],
            &RenderConfig::default(),
            now(),
        );
        let desc = &doc.items[0].description;
        assert!(desc.contains("<strong>[review requested]</strong>"));
        assert!(desc.contains("<span>[Pull request]</span>"));
        assert!(desc.contains(UNREAD_MARKER));
        assert!(desc.contains("Fix &lt;parser&gt;"));
        assert!(desc.contains("<strong>Reason:</strong> review_requested<br>"));
        assert!(desc.contains("<strong>Unread:</strong> yes<br>"));
        assert!(desc.contains("href=\"https://github.com/acme/widgets\""));
        assert!(desc.contains("2024-05-01T12:00:00+00:00"));
    }

    #[test]
    fn plain_description_is_line_oriented() {
        let presentation = RenderConfig {
            html_description: false,
            ..RenderConfig::default()
        };
        let doc = render(
            &[thread("7", Some("Fix parser"), Reason::CiActivity, false)],
            &presentation,
            now(),
        );
        let desc = &doc.items[0].description;
        assert!(desc.starts_with("[CI] [Pull request]\n"));
        assert!(!desc.contains(UNREAD_MARKER));
        assert!(desc.contains("\nReason: ci_activity\n"));
        assert!(desc.contains("\nUnread: no"));
        assert!(!desc.contains("<p>"));
    }

    #[test]
    fn item_order_follows_input() {
        let threads = [
            thread("2", Some("b"), Reason::Mention, true),
            thread("1", Some("a"), Reason::Mention, true),
        ];
        let doc = render(&threads, &RenderConfig::default(), now());
        let guids: Vec<_> = doc.items.iter().map(|i| i.guid.as_str()).collect();
        assert_eq!(guids, vec!["2", "1"]);
    }

    #[test]
    fn xml_is_well_formed_and_escaped() {
        let presentation = RenderConfig {
            title: "Me & my <feed>".into(),
            ..RenderConfig::default()
        };
        let doc = render(
            &[thread("7", Some("a & b"), Reason::Mention, true)],
            &presentation,
            now(),
        );
        let xml = doc.to_xml();
        assert_eq!(count_items(&xml), 1);
        assert!(xml.contains("<title>Me &amp; my &lt;feed&gt;</title>"));
        assert!(xml.contains("<title>[acme/widgets] a &amp; b</title>"));
        assert!(xml.contains("<guid isPermaLink=\"false\">7</guid>"));
        assert!(xml.contains("May 2024 12:00:00 +0000</pubDate>"));
    }

    #[test]
    fn control_characters_are_dropped_from_xml() {
        let doc = render(
            &[
                thread("7", Some("bad\u{8}title\u{1B}"), Reason::Mention, true),
                thread("8", Some("fine\ttitle"), Reason::Mention, true),
            ],
            &RenderConfig::default(),
            now(),
        );
        let xml = doc.to_xml();
        assert_eq!(count_items(&xml), 2);
        assert!(xml.contains("<title>[acme/widgets] badtitle</title>"));
        assert!(xml.contains("<title>[acme/widgets] fine\ttitle</title>"));
        assert!(!xml.contains('\u{8}'));
        assert!(!xml.contains('\u{1B}'));
    }

    #[test]
    fn unmatched_repo_filter_renders_empty_but_valid_feed() {
        let raw = vec![thread("7", Some("Fix parser"), Reason::Mention, true)];
        let cfg = FilterConfig {
            repos_include: ["x/y".to_owned()].into_iter().collect(),
            ..FilterConfig::default()
        };
        let filtered = filter::apply(raw, &cfg);
        assert!(filtered.is_empty());

        let doc = render(&filtered, &RenderConfig::default(), now());
        assert!(doc.items.is_empty());
        let xml = doc.to_xml();
        assert_eq!(count_items(&xml), 0);
        assert!(xml.contains("<channel>"));
        assert!(xml.trim_end().ends_with("</rss>"));
    }
}
