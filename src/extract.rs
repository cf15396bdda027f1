//! The extract module submits aggregated website text to an LLM constrained by
//! the extraction schema and turns the answer into a validated record.

use std::ops::AddAssign;
use std::time::Duration;

use llm::chat::{ChatMessage, ChatProvider, StructuredOutputFormat, Usage};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use rate_guard::{RateLimit, StdTokenBucket, TokenBucketBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregatedContent;
use crate::constants::{CODE_FENCE_STRIPPER, DEFAULT_PROMPT_TEMPLATE, THINK_STRIPPER};
use crate::error::{PlaceError, SchemaValidationError, ServiceError};
use crate::output::OutputRecord;
use crate::place::PlaceRecord;
use crate::schema::{PlaceExtraction, extraction_schema, parse_payload};

static THINK_STRIPPER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(THINK_STRIPPER).expect("Failed to compile THINK_STRIPPER regex"));
static CODE_FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(CODE_FENCE_STRIPPER).expect("Failed to compile CODE_FENCE_STRIPPER regex")
});

/// Explicit extraction-service context, built once by the caller and passed to every call.
pub struct ExtractContext<'a> {
    /// LLM model to use for extraction
    pub model: &'a dyn ChatProvider,
    /// Prompt template to use, `{text}` is replaced by the website content
    pub prompt_template: Option<&'a str>,
    /// Rate limiter for controlling request frequency
    pub rate_limiter: Option<&'a StdTokenBucket>,
}

/// Tokens consumed by extraction calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl From<&Usage> for TokenUsage {
    fn from(usage: &Usage) -> Self {
        Self {
            input_tokens: u64::from(usage.prompt_tokens),
            output_tokens: u64::from(usage.completion_tokens),
            total_tokens: u64::from(usage.total_tokens),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A schema-valid payload together with what it cost.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    pub payload: PlaceExtraction,
    pub usage: TokenUsage,
}

/// Outcome of an extraction call that reached the service.
#[derive(Debug)]
pub enum Extraction {
    Valid(Box<ExtractionResult>),
    /// The payload did not conform; nothing of it is kept.
    Rejected(SchemaValidationError),
}

/// Structured output settings for the LLM builder.
pub fn structured_output_format() -> StructuredOutputFormat {
    StructuredOutputFormat {
        name: "PlaceExtraction".to_owned(),
        description: Some(
            "Business details, promotions, events, menu items and opening hours".to_owned(),
        ),
        schema: Some(extraction_schema()),
        strict: Some(true),
    }
}

/// Builds a token bucket allowing `rpm` requests per minute.
pub fn rate_limiter(rpm: u32) -> Option<StdTokenBucket> {
    let capacity = u64::from(rpm.max(1));
    let refill_interval = Duration::from_secs_f64(60.0 / capacity as f64);

    TokenBucketBuilder::builder()
        .capacity(capacity)
        .refill_amount(1_u64)
        .refill_every(refill_interval)
        .with_time(rate_guard::StdTimeSource::new())
        .with_precision::<rate_guard::Nanos>()
        .build()
        .map_err(|e| warn!("Running without a rate limit, {rpm} requests per minute rejected: {e:?}"))
        .ok()
}

/// Extracts a structured record from aggregated website content.
///
/// Blank content short-circuits to an empty payload without calling the model.
///
/// # Errors
///
/// Returns a [`ServiceError`] if the model call itself fails. A payload that
/// fails validation is not an error here but [`Extraction::Rejected`].
pub async fn extract(
    content: &AggregatedContent,
    ctx: &ExtractContext<'_>,
) -> Result<Extraction, ServiceError> {
    if content.is_blank() {
        info!("No website text to extract from, producing an empty record");
        return Ok(Extraction::Valid(Box::default()));
    }

    let messages = build_messages(&content.text(), ctx.prompt_template);
    wait_for_rate_limit(ctx.rate_limiter).await;

    let response = ctx
        .model
        .chat(&messages)
        .await
        .map_err(|err| ServiceError(format!("LLM error: {err}.")))?;

    let usage = response
        .usage()
        .as_ref()
        .map(TokenUsage::from)
        .unwrap_or_default();
    info!(
        "Token usage - Input: {}, Output: {}, Total: {}",
        usage.input_tokens, usage.output_tokens, usage.total_tokens
    );

    let raw = response.text().unwrap_or_default();
    debug!("Raw extraction payload: {raw}");

    match parse_payload(&strip_wrapping(&raw)) {
        Ok(payload) => Ok(Extraction::Valid(Box::new(ExtractionResult { payload, usage }))),
        Err(error) => {
            warn!("Discarding extraction payload: {error}");
            Ok(Extraction::Rejected(error))
        }
    }
}

/// Runs the extraction and reconciles the result with the place's identity fields.
///
/// # Errors
///
/// Returns [`PlaceError::Service`] if the model call fails and
/// [`PlaceError::SchemaValidation`] if the payload is rejected.
pub async fn extract_place(
    place: &PlaceRecord,
    content: &AggregatedContent,
    ctx: &ExtractContext<'_>,
) -> Result<OutputRecord, PlaceError> {
    match extract(content, ctx).await? {
        Extraction::Valid(result) => Ok(OutputRecord::reconcile(place, *result)),
        Extraction::Rejected(error) => Err(error.into()),
    }
}

fn build_messages(text: &str, prompt_template: Option<&str>) -> Vec<ChatMessage> {
    let prompt_template = prompt_template.unwrap_or(DEFAULT_PROMPT_TEMPLATE);
    let prompt = format!(
        "{}\n\nJSON schema:\n{}",
        prompt_template.replace("{text}", text),
        extraction_schema()
    );

    let mut messages = vec![ChatMessage::user().content(prompt)];
    if !prompt_template.contains("{text}") {
        messages.push(ChatMessage::user().content(text));
    }

    messages.into_iter().map(|message| message.build()).collect()
}

async fn wait_for_rate_limit(rate_limiter: Option<&StdTokenBucket>) {
    if let Some(limiter) = rate_limiter {
        while limiter.try_acquire(1).is_err() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Removes reasoning blocks and a surrounding Markdown code fence.
pub fn strip_wrapping(response: &str) -> String {
    let response = THINK_STRIPPER_REGEX.replace_all(response, "");

    match CODE_FENCE_REGEX
        .captures(&response)
        .and_then(|captures| captures.get(1))
    {
        Some(inner) => inner.as_str().trim().to_owned(),
        None => response.trim().to_owned(),
    }
}
