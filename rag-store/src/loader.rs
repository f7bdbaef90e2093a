//! URL loading: fetch a page and reduce it to readable text.

use std::{future::Future, pin::Pin};

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::errors::RagError;
use crate::record::Document;

/// Fetches a URL into a [`Document`].
pub trait SourceLoader: Send + Sync {
    fn load<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Document, RagError>> + Send + 'a>>;
}

/// Tags whose text never reaches the document.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "template", "noscript", "svg", "nav", "header", "footer",
];

/// Tags whose text forms one block of the document.
const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "blockquote", "pre", "code", "td", "th", "dt",
    "dd",
];

#[derive(Clone, Debug)]
struct Selectors {
    article: Selector,
    main: Selector,
    body: Selector,
    title: Selector,
    html: Selector,
}

impl Selectors {
    fn new() -> Result<Self, RagError> {
        let parse = |s: &str| {
            Selector::parse(s).map_err(|e| RagError::Config(format!("selector '{s}': {e}")))
        };
        Ok(Self {
            article: parse("article")?,
            main: parse("main")?,
            body: parse("body")?,
            title: parse("title")?,
            html: parse("html")?,
        })
    }

    fn pick_root<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        document
            .select(&self.article)
            .next()
            .or_else(|| document.select(&self.main).next())
            .or_else(|| document.select(&self.body).next())
            .unwrap_or_else(|| document.root_element())
    }
}

/// HTTP loader built on `reqwest` + `scraper`.
///
/// HTML is reduced to its readable blocks (paragraphs, headings, list items,
/// code). Other content types are taken as plain text. Metadata: `source`
/// (the URL), plus `title` and `language` when the page declares them.
#[derive(Clone, Debug)]
pub struct WebLoader {
    client: reqwest::Client,
    selectors: Selectors,
}

impl WebLoader {
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn new() -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("doc-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RagError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            selectors: Selectors::new()?,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Document, RagError> {
        debug!(%url, "fetching source");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RagError::fetch(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RagError::fetch(url, format!("HTTP {status}")));
        }
        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(false);
        let bytes = resp.bytes().await.map_err(|e| RagError::fetch(url, e))?;
        let body = String::from_utf8_lossy(&bytes);

        let looks_like_html = is_html || body.trim_start().starts_with('<');
        let doc = if looks_like_html {
            self.from_html(&body, url)
        } else {
            Document::new(body.trim().to_string(), url)
        };
        if doc.text.is_empty() {
            warn!(%url, "source has no readable text");
        }
        Ok(doc)
    }

    /// Reduces an HTML page to a document.
    pub fn from_html(&self, html: &str, url: &str) -> Document {
        let page = Html::parse_document(html);
        let root = self.selectors.pick_root(&page);

        let mut blocks: Vec<String> = Vec::new();
        for element in root.descendent_elements() {
            let tag = element.value().name();
            if !BLOCK_TAGS.contains(&tag) || has_ancestor_in(&element, SKIPPED_TAGS) {
                continue;
            }
            // Nested blocks are covered by their outermost block.
            if has_ancestor_in(&element, BLOCK_TAGS) {
                continue;
            }
            let text = extract_text(&element, matches!(tag, "pre" | "code"));
            if !text.is_empty() {
                blocks.push(text);
            }
        }
        if blocks.is_empty() {
            let text = extract_text(&root, false);
            if !text.is_empty() {
                blocks.push(text);
            }
        }

        let mut doc = Document::new(blocks.join("\n\n"), url);
        if let Some(title) = page
            .select(&self.selectors.title)
            .next()
            .map(|t| extract_text(&t, false))
            .filter(|t| !t.is_empty())
        {
            doc.metadata.insert("title".into(), title);
        }
        if let Some(lang) = page
            .select(&self.selectors.html)
            .next()
            .and_then(|h| h.value().attr("lang"))
        {
            doc.metadata.insert("language".into(), lang.to_string());
        }
        doc
    }
}

impl SourceLoader for WebLoader {
    fn load<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Document, RagError>> + Send + 'a>> {
        Box::pin(self.fetch(url))
    }
}

fn has_ancestor_in(element: &ElementRef<'_>, tags: &[&str]) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| tags.contains(&a.value().name()))
}

fn extract_text(element: &ElementRef<'_>, preserve_newlines: bool) -> String {
    let raw: String = element.text().collect();
    if preserve_newlines {
        raw.lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
