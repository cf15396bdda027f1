//! The aggregate module joins crawled pages into one text body, each page
//! introduced by a marker naming its URL.

use std::fmt;

use crate::fetch::PageContent;

/// Marker line placed before a page's text.
pub fn provenance_marker(url: &url::Url) -> String {
    format!("=== {url} ===")
}

/// Crawled pages in visit order, ready to be handed to the extraction engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedContent {
    pages: Vec<PageContent>,
}

impl AggregatedContent {
    pub fn section_count(&self) -> usize {
        self.pages.len()
    }

    /// True when no page contributed any text.
    pub fn is_blank(&self) -> bool {
        self.pages.iter().all(|page| page.text.trim().is_empty())
    }

    /// The joined text. Every page gets a marker, including pages that failed to fetch.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AggregatedContent {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, page) in self.pages.iter().enumerate() {
            if index > 0 {
                writeln!(formatter)?;
            }
            write!(formatter, "{}\n{}", provenance_marker(&page.url), page.text)?;
        }
        Ok(())
    }
}

/// Aggregates pages in the order given, which must be the visit order.
pub fn aggregate(pages: Vec<PageContent>) -> AggregatedContent {
    AggregatedContent { pages }
}
