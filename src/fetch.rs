//! The fetch module retrieves a single page and reduces it to its visible text
//! and outbound links.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use once_cell::sync::Lazy;
use reqwest::redirect::Policy;
use scraper::{Html, Node, Selector};
use url::Url;

use crate::constants::REDIRECT_LIMIT;
use crate::crawl::normalized_domain;
use crate::error::FetchError;

static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("Failed to compile body selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Failed to compile link selector"));

/// Elements whose text is never rendered.
const HIDDEN_ELEMENTS: [&str; 7] = [
    "script", "style", "noscript", "template", "svg", "head", "iframe",
];

const IGNORED_HREF_PREFIXES: [&str; 4] = ["#", "javascript:", "mailto:", "tel:"];

/// The text and links of one fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub url: Url,
    /// Visible text with whitespace collapsed to single spaces.
    pub text: String,
    /// Absolute http(s) links without fragments, in document order.
    pub outbound_links: Vec<Url>,
    /// Where the request ended up, if a redirect was followed.
    pub redirected_to: Option<Url>,
}

impl PageContent {
    /// Content of a page that could not be fetched.
    pub fn empty(url: Url) -> Self {
        Self {
            url,
            text: String::new(),
            outbound_links: Vec::new(),
            redirected_to: None,
        }
    }
}

/// Source of pages for the crawler.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on network failure, timeout or a non-success status.
    async fn fetch(&self, url: &Url) -> Result<PageContent, FetchError>;
}

/// [`PageFetcher`] over HTTP.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(same_domain_redirects())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<PageContent, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        // Relative links resolve against where we ended up, the page keeps the URL we asked for.
        let final_url = response.url().clone();
        let html = response.text().await?;
        let mut page = parse_page(&final_url, &html);
        page.url = url.clone();
        if final_url != *url {
            page.redirected_to = Some(final_url);
        }

        Ok(page)
    }
}

/// Follows redirects only while they stay on the domain of the first request.
/// A redirect leaving the domain is not followed, so the 3xx surfaces as a fetch failure.
fn same_domain_redirects() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() > REDIRECT_LIMIT {
            return attempt.error("too many redirects");
        }

        let origin = attempt.previous().first().and_then(normalized_domain);
        let target = normalized_domain(attempt.url());
        if origin.is_some() && origin == target {
            attempt.follow()
        } else {
            warn!(
                "Not following redirect to {} which leaves {}",
                attempt.url(),
                origin.as_deref().unwrap_or("<unknown>")
            );
            attempt.stop()
        }
    })
}

/// Parses an HTML document into its visible text and outbound links.
pub fn parse_page(url: &Url, html: &str) -> PageContent {
    let document = Html::parse_document(html);

    PageContent {
        url: url.clone(),
        text: visible_text(&document),
        outbound_links: outbound_links(&document, url),
        redirected_to: None,
    }
}

fn visible_text(document: &Html) -> String {
    let root = document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element());

    root.descendants()
        .filter(|node| !node.ancestors().any(|ancestor| is_hidden(ancestor.value())))
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some(&**text),
            _ => None,
        })
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_hidden(node: &Node) -> bool {
    node.as_element()
        .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
}

fn outbound_links(document: &Html, base: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();

    document
        .select(&LINK_SELECTOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .filter(|href| !is_ignored_href(href))
        .filter_map(|href| base.join(href).ok())
        .filter(|link| matches!(link.scheme(), "http" | "https"))
        .map(|mut link| {
            link.set_fragment(None);
            link
        })
        .filter(|link| seen.insert(link.as_str().to_owned()))
        .collect()
}

fn is_ignored_href(href: &str) -> bool {
    let href = href.to_lowercase();
    href.is_empty()
        || IGNORED_HREF_PREFIXES
            .iter()
            .any(|prefix| href.starts_with(prefix))
}
