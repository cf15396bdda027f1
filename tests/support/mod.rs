#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use llm::{
    chat::{ChatMessage, ChatProvider, ChatResponse, Tool, Usage},
    error::LLMError,
};
use placecrawl::{FetchError, PageContent, PageFetcher, PlaceRecord};
use reqwest::StatusCode;
use url::Url;

pub fn url(raw: &str) -> Url {
    Url::parse(raw).expect("Expected a valid test URL.")
}

pub fn place(website: Option<&str>) -> PlaceRecord {
    PlaceRecord {
        id: "ChIJ-kellys-pub".to_owned(),
        name: "Kelly's Pub & Grill!!".to_owned(),
        latitude: 41.921_447,
        longitude: -87.652_931,
        website: website.map(str::to_owned),
        state_code: Some("IL".to_owned()),
    }
}

struct StubPage {
    text: String,
    links: Vec<Url>,
    delay: Duration,
}

/// In-memory site graph. Unknown URLs answer 404.
#[derive(Default)]
pub struct StubSite {
    pages: HashMap<String, StubPage>,
    redirects: HashMap<String, Url>,
    fetched: Mutex<Vec<String>>,
}

impl StubSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, raw: &str, text: &str, links: &[&str]) -> Self {
        self.slow_page(raw, text, links, Duration::ZERO)
    }

    pub fn slow_page(mut self, raw: &str, text: &str, links: &[&str], delay: Duration) -> Self {
        self.pages.insert(
            url(raw).to_string(),
            StubPage {
                text: text.to_owned(),
                links: links.iter().copied().map(url).collect(),
                delay,
            },
        );
        self
    }

    /// Answers `from` with the page at `to`, as if the server redirected there.
    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(url(from).to_string(), url(to));
        self
    }

    /// URLs requested so far, in request order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("Stub mutex poisoned").clone()
    }
}

#[async_trait]
impl PageFetcher for StubSite {
    async fn fetch(&self, url: &Url) -> Result<PageContent, FetchError> {
        self.fetched
            .lock()
            .expect("Stub mutex poisoned")
            .push(url.to_string());

        let target = self.redirects.get(url.as_str());
        let Some(page) = self.pages.get(target.unwrap_or(url).as_str()) else {
            return Err(FetchError::Status(StatusCode::NOT_FOUND));
        };
        if !page.delay.is_zero() {
            tokio::time::sleep(page.delay).await;
        }

        Ok(PageContent {
            url: url.clone(),
            text: page.text.clone(),
            outbound_links: page.links.clone(),
            redirected_to: target.cloned(),
        })
    }
}

/// Chat provider answering every request with the same text and usage.
pub struct StubLlmProvider {
    response_content: String,
    usage: Option<(u32, u32)>,
    calls: AtomicUsize,
}

impl StubLlmProvider {
    pub fn new(response_content: &str) -> Self {
        StubLlmProvider {
            response_content: response_content.to_owned(),
            usage: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.usage = Some((input_tokens, output_tokens));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct StringResponse {
    text: String,
    usage: Option<Usage>,
}

impl ChatResponse for StringResponse {
    fn text(&self) -> Option<String> {
        Some(self.text.clone())
    }

    fn tool_calls(&self) -> Option<Vec<llm::ToolCall>> {
        panic!()
    }

    fn thinking(&self) -> Option<String> {
        None
    }

    fn usage(&self) -> Option<Usage> {
        self.usage.clone()
    }
}

impl std::fmt::Display for StringResponse {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.text)
    }
}

impl ChatProvider for StubLlmProvider {
    fn chat<'life0, 'life1, 'async_trait>(
        &'life0 self,
        _messages: &'life1 [ChatMessage],
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Box<dyn ChatResponse>, LLMError>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let usage = self.usage.and_then(|(input, output)| {
                serde_json::from_value::<Usage>(serde_json::json!({
                    "prompt_tokens": input,
                    "completion_tokens": output,
                    "total_tokens": input + output,
                }))
                .ok()
            });

            Ok(Box::new(StringResponse {
                text: self.response_content.clone(),
                usage,
            }) as Box<dyn ChatResponse>)
        })
    }

    fn chat_with_tools<'life0, 'life1, 'life2, 'async_trait>(
        &'life0 self,
        _messages: &'life1 [ChatMessage],
        _tools: Option<&'life2 [Tool]>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Box<dyn ChatResponse>, LLMError>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        'life2: 'async_trait,
        Self: 'async_trait,
    {
        panic!()
    }
}

/// A schema-conforming payload whose identity fields disagree with [`place`].
pub const VALID_PAYLOAD: &str = r#"{
    "id": "hallucinated-id",
    "latitude": 1.5,
    "longitude": 2.5,
    "business": {
        "name": "Kelly's Pub",
        "street": "949 W Webster Ave",
        "city": "Chicago",
        "stateCode": "IL",
        "zip": "60614",
        "amenity": "pub",
        "cuisine": ["american"],
        "priceLevel": "$$",
        "rating": 4.5,
        "description": null,
        "phone": "(773) 281-0005",
        "email": null,
        "website": "https://www.kellyspub.com/",
        "profileImageUrl": null,
        "imageUrls": [],
        "primaryType": "pub",
        "secondaryTypes": ["bar"]
    },
    "promotions": [
        {
            "title": "Happy Hour",
            "description": "$5 drafts",
            "hours": [{"day": "Monday", "openHour": 16, "openMinute": 0, "closeHour": 18, "closeMinute": null}]
        }
    ],
    "events": [
        {"title": "Trivia Night", "description": null, "startDate": "2025-09-10T19:00", "endDate": null, "hours": []}
    ],
    "menuItems": [
        {"name": "Reuben", "description": "Corned beef on rye", "price": 14.5, "category": "Sandwiches"}
    ],
    "dailyHours": [
        {"day": "Monday", "openHour": 11, "openMinute": 0, "closeHour": 23, "closeMinute": 30}
    ]
}"#;
