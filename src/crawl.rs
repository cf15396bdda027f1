//! The crawl module walks a website breadth-first from its root, staying on the
//! root's domain and within a page budget.

use std::collections::{HashSet, VecDeque};

use futures::StreamExt;
use futures::stream::FuturesOrdered;
use log::{debug, info, warn};
use url::Url;

use crate::constants::{DEFAULT_CONCURRENCY, DEFAULT_MAX_PAGES};
use crate::fetch::{PageContent, PageFetcher};

/// Limits of a single crawl.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrawlConfig {
    /// Maximum number of pages fetched, failed fetches included.
    pub max_pages: usize,
    /// Maximum number of fetches in flight.
    pub concurrency: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Host of `url` lower-cased and without a leading `www.`.
///
/// Returns `None` for URLs without a host.
pub fn normalized_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();

    Some(match host.strip_prefix("www.") {
        Some(stripped) => stripped.to_owned(),
        None => host,
    })
}

/// Identity of a page for deduplication. Scheme, `www.`, a trailing `/` and
/// the fragment do not make a URL a different page.
pub fn url_key(url: &Url) -> String {
    let mut key = normalized_domain(url).unwrap_or_default();
    if let Some(port) = url.port() {
        key = format!("{key}:{port}");
    }
    key.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    key
}

/// Frontier bookkeeping for one crawl. Never outlives the crawl.
#[derive(Debug)]
pub struct CrawlState {
    root_domain: Option<String>,
    max_pages: usize,
    /// Keys of URLs handed out for fetching.
    visited: HashSet<String>,
    /// Keys of every URL ever put on the frontier or reached by a redirect.
    queued: HashSet<String>,
    frontier: VecDeque<Url>,
}

impl CrawlState {
    pub fn new(root: &Url, max_pages: usize) -> Self {
        let mut root = root.clone();
        root.set_fragment(None);

        Self {
            root_domain: normalized_domain(&root),
            max_pages,
            visited: HashSet::new(),
            queued: HashSet::from([url_key(&root)]),
            frontier: VecDeque::from([root]),
        }
    }

    /// Takes the next URL to fetch, if the budget allows one more.
    pub fn next_url(&mut self) -> Option<Url> {
        if self.visited.len() >= self.max_pages {
            return None;
        }

        let url = self.frontier.pop_front()?;
        self.visited.insert(url_key(&url));
        Some(url)
    }

    /// Appends the unseen same-domain links to the frontier, preserving their order.
    pub fn discover(&mut self, links: &[Url]) {
        for link in links {
            if self.root_domain.is_none() || normalized_domain(link) != self.root_domain {
                debug!("Ignoring off-domain link {link}");
                continue;
            }

            if self.queued.insert(url_key(link)) {
                let mut link = link.clone();
                link.set_fragment(None);
                self.frontier.push_back(link);
            }
        }
    }

    /// Records the target of a followed redirect so it is not fetched again.
    pub fn mark_reached(&mut self, target: &Url) {
        self.queued.insert(url_key(target));
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn frontier(&self) -> impl Iterator<Item = &Url> {
        self.frontier.iter()
    }
}

/// Crawls up to `config.max_pages` pages reachable from `root` on the root's domain.
///
/// Pages are returned in breadth-first discovery order. Up to `config.concurrency`
/// fetches run at once, but each page's links are only added to the frontier once
/// every page discovered before it has completed, so the outcome is the same as a
/// sequential crawl. Failed fetches count against the budget and yield empty pages.
pub async fn crawl(root: &Url, config: &CrawlConfig, fetcher: &dyn PageFetcher) -> Vec<PageContent> {
    let mut state = CrawlState::new(root, config.max_pages);
    let concurrency = config.concurrency.max(1);
    let mut in_flight = FuturesOrdered::new();
    let mut pages = Vec::new();

    info!("Crawling {root} (up to {} pages)", config.max_pages);

    loop {
        while in_flight.len() < concurrency {
            let Some(url) = state.next_url() else {
                break;
            };
            in_flight.push_back(fetch_or_empty(fetcher, url));
        }

        let Some(page) = in_flight.next().await else {
            break;
        };
        if let Some(target) = &page.redirected_to {
            state.mark_reached(target);
        }
        state.discover(&page.outbound_links);
        pages.push(page);
    }

    info!("Crawled {} pages from {root}", state.visited_count());
    pages
}

async fn fetch_or_empty(fetcher: &dyn PageFetcher, url: Url) -> PageContent {
    match fetcher.fetch(&url).await {
        Ok(page) => {
            debug!(
                "Fetched {url}: {} chars, {} links",
                page.text.len(),
                page.outbound_links.len()
            );
            page
        }
        Err(error) => {
            warn!("Skipping {url} as {error}");
            PageContent::empty(url)
        }
    }
}
