//! Web page, crawl, and sitemap loading.
//!
//! Page text comes from a readability pass: the first non-empty of `<main>`,
//! `<article>`, the largest content-hinted `<div>`, then `<body>`, with
//! script/style/nav subtrees dropped and whitespace collapsed. Pages whose
//! readable text is shorter than the configured minimum are discarded as
//! boilerplate.
//!
//! Crawling is breadth-first from the start URL with a politeness delay
//! between fetches, bounded by the source's `max_pages` and (by default)
//! its domain. Sitemap loading fetches the XML once, takes up to
//! `max_pages` `<loc>` entries, and fetches each page.

use anyhow::{anyhow, bail, Result};
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WebConfig;
use crate::models::RawDocument;

/// Substrings that disqualify a link from crawling: non-content schemes,
/// asset files, and account/commerce pages.
const LINK_SKIP_PATTERNS: &[&str] = &[
    "javascript:",
    "mailto:",
    ".pdf",
    ".jpg",
    ".jpeg",
    ".png",
    ".gif",
    ".css",
    ".js",
    "login",
    "register",
    "cart",
    "checkout",
];

/// Elements whose text is never page content.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript",
];

pub struct WebLoader {
    client: reqwest::Client,
    config: WebConfig,
}

impl WebLoader {
    pub fn new(config: &WebConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Load one page as a document; unreachable or boilerplate pages yield
    /// nothing.
    pub async fn load_single(&self, url: &str) -> Vec<RawDocument> {
        self.extract_page(url).await.into_iter().collect()
    }

    async fn extract_page(&self, url: &str) -> Option<RawDocument> {
        let html = match self.fetch(url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url, error = %e, "fetch failed");
                return None;
            }
        };
        let (title, text) = match readable_text(&html, self.config.min_text_len) {
            Some(parts) => parts,
            None => {
                debug!(url, "page below minimum readable length");
                return None;
            }
        };
        Some(RawDocument {
            size: text.len(),
            text,
            path: url.to_string(),
            filename: url.to_string(),
            file_type: ".html".to_string(),
            title,
        })
    }

    /// Breadth-first crawl from `start`, up to `max_pages` extracted pages.
    pub async fn crawl(&self, start: &str, max_pages: usize, same_domain_only: bool) -> Vec<RawDocument> {
        let base = match Url::parse(start) {
            Ok(url) => url,
            Err(e) => {
                warn!(url = start, error = %e, "invalid crawl start URL");
                return Vec::new();
            }
        };

        let mut documents = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([start.to_string()]);

        while let Some(url) = queue.pop_front() {
            if documents.len() >= max_pages {
                break;
            }
            if !visited.insert(url.clone()) {
                continue;
            }

            let html = match self.fetch(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(url, error = %e, "fetch failed, skipping page");
                    continue;
                }
            };

            if let Some((title, text)) = readable_text(&html, self.config.min_text_len) {
                documents.push(RawDocument {
                    size: text.len(),
                    text,
                    path: url.clone(),
                    filename: url.clone(),
                    file_type: ".html".to_string(),
                    title,
                });
            }

            if documents.len() < max_pages {
                for link in extract_links(&html, &base, same_domain_only) {
                    if !visited.contains(&link) {
                        queue.push_back(link);
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(self.config.crawl_delay_ms)).await;
        }

        info!(start, pages = documents.len(), "crawl complete");
        documents
    }

    /// Load the pages listed in a sitemap, up to `max_pages`.
    pub async fn from_sitemap(&self, sitemap_url: &str, max_pages: usize) -> Vec<RawDocument> {
        let xml = match self.fetch(sitemap_url).await {
            Ok(xml) => xml,
            Err(e) => {
                warn!(url = sitemap_url, error = %e, "failed to fetch sitemap");
                return Vec::new();
            }
        };
        let urls = parse_sitemap_urls(&xml, max_pages);
        info!(url = sitemap_url, count = urls.len(), "sitemap parsed");

        let mut documents = Vec::new();
        for url in urls {
            if let Some(doc) = self.extract_page(&url).await {
                documents.push(doc);
            }
            tokio::time::sleep(Duration::from_millis(self.config.sitemap_delay_ms)).await;
        }
        documents
    }

    /// HEAD probe; true when the server answers with a success status.
    pub async fn validate(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// GET with exponential backoff. 429 and 5xx retry; other client errors
    /// fail immediately.
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("HTTP {status} fetching {url}"));
                        continue;
                    }
                    bail!("HTTP {status} fetching {url}");
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("fetch failed after retries: {url}")))
    }
}

/// Title and readable body text of a page, or `None` when the readable text
/// is shorter than `min_len` bytes.
pub fn readable_text(html: &str, min_len: usize) -> Option<(Option<String>, String)> {
    let doc = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let text = collapse_whitespace(&readable_body(&doc));
    if text.len() < min_len {
        return None;
    }
    Some((title, text))
}

fn readable_body(doc: &Html) -> String {
    for tag in ["main", "article"] {
        if let Ok(sel) = Selector::parse(tag) {
            if let Some(el) = doc.select(&sel).next() {
                let text = element_text(el);
                if !text.trim().is_empty() {
                    return text;
                }
            }
        }
    }

    // Divs that advertise themselves as content; take the largest.
    if let Ok(sel) = Selector::parse("div") {
        let best = doc
            .select(&sel)
            .filter(|el| {
                let element = el.value();
                let hints = format!(
                    "{} {}",
                    element.attr("class").unwrap_or(""),
                    element.attr("id").unwrap_or("")
                )
                .to_lowercase();
                ["content", "main", "article"].iter().any(|h| hints.contains(h))
            })
            .map(element_text)
            .max_by_key(String::len);
        if let Some(text) = best {
            if !text.trim().is_empty() {
                return text;
            }
        }
    }

    if let Ok(sel) = Selector::parse("body") {
        if let Some(el) = doc.select(&sel).next() {
            return element_text(el);
        }
    }
    String::new()
}

/// Descendant text with script/style/nav subtrees skipped.
fn element_text(el: ElementRef) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if SKIP_TAGS.contains(&child_el.value().name()) {
                continue;
            }
            collect_text(child_el, out);
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Crawlable links on a page, absolutized against `base`, deduplicated,
/// with fragments stripped.
pub fn extract_links(html: &str, base: &Url, same_domain_only: bool) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    let mut seen = HashSet::new();
    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') {
            continue;
        }
        let lower = href.to_lowercase();
        if LINK_SKIP_PATTERNS.iter().any(|p| lower.contains(p)) {
            continue;
        }
        let Ok(mut absolute) = base.join(href) else {
            continue;
        };
        absolute.set_fragment(None);
        if !matches!(absolute.scheme(), "http" | "https") {
            continue;
        }
        if same_domain_only && absolute.domain() != base.domain() {
            continue;
        }
        let link = absolute.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
    links
}

/// `<loc>` entries of a sitemap, in order, up to `max_urls`.
pub fn parse_sitemap_urls(xml: &str, max_urls: usize) -> Vec<String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    let mut urls = Vec::new();
    let mut in_loc = false;

    loop {
        if urls.len() >= max_urls {
            break;
        }
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"loc" => in_loc = true,
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"loc" => in_loc = false,
            Ok(Event::Text(t)) if in_loc => {
                if let Ok(text) = t.unescape() {
                    let url = text.trim().to_string();
                    if url.starts_with("http") {
                        urls.push(url);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "sitemap parse error");
                break;
            }
            _ => {}
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_text_prefers_main() {
        let html = r#"
            <html><head><title>  Test   Page </title>
            <script>var ignored = 1;</script></head>
            <body>
              <nav>navigation junk that is long enough to matter</nav>
              <main>This is the real article body with enough words to pass
              the minimum readable length for the page.</main>
              <footer>copyright</footer>
            </body></html>
        "#;
        let (title, text) = readable_text(html, 50).unwrap();
        assert_eq!(title.as_deref(), Some("Test Page"));
        assert!(text.starts_with("This is the real article body"));
        assert!(!text.contains("navigation"));
        assert!(!text.contains("ignored"));
    }

    #[test]
    fn test_readable_text_content_div_fallback() {
        let html = r#"
            <html><body>
              <div class="sidebar">short</div>
              <div class="main-content">A content division holding the page
              text, selected because its class names it as content and it is
              the largest such block on the page.</div>
            </body></html>
        "#;
        let (_, text) = readable_text(html, 50).unwrap();
        assert!(text.contains("content division"));
        assert!(!text.starts_with("short"));
    }

    #[test]
    fn test_readable_text_rejects_short_pages() {
        assert!(readable_text("<html><body>tiny</body></html>", 100).is_none());
    }

    #[test]
    fn test_extract_links_filters_and_absolutizes() {
        let base = Url::parse("https://example.com/docs/").unwrap();
        let html = r##"
            <a href="page1.html">one</a>
            <a href="/page2">two</a>
            <a href="https://example.com/page3#section">three</a>
            <a href="https://other.org/page">offsite</a>
            <a href="mailto:team@example.com">mail</a>
            <a href="/assets/style.css">css</a>
            <a href="/account/login">login</a>
            <a href="#top">anchor</a>
            <a href="page1.html">duplicate</a>
        "##;
        let links = extract_links(html, &base, true);
        assert_eq!(
            links,
            vec![
                "https://example.com/docs/page1.html",
                "https://example.com/page2",
                "https://example.com/page3",
            ]
        );

        let all = extract_links(html, &base, false);
        assert!(all.contains(&"https://other.org/page".to_string()));
    }

    #[test]
    fn test_parse_sitemap_urls() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://example.com/a</loc><lastmod>2024-01-01</lastmod></url>
              <url><loc> https://example.com/b </loc></url>
              <url><loc>https://example.com/c</loc></url>
            </urlset>"#;
        assert_eq!(
            parse_sitemap_urls(xml, 10),
            vec![
                "https://example.com/a",
                "https://example.com/b",
                "https://example.com/c",
            ]
        );
        assert_eq!(parse_sitemap_urls(xml, 2).len(), 2);
    }
}
