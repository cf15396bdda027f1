//! The pipeline module drives one place at a time through
//! crawl, aggregation, extraction and output.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use url::Url;

use crate::aggregate::aggregate;
use crate::constants::UNKNOWN_REGION;
use crate::crawl::{CrawlConfig, crawl};
use crate::error::PlaceError;
use crate::extract::{ExtractContext, TokenUsage, extract_place};
use crate::fetch::PageFetcher;
use crate::output::{OnConflict, OutputRecord, write_record};
use crate::place::PlaceRecord;

/// Processing state of a place.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PlaceStage {
    Pending,
    Crawling,
    Aggregating,
    Extracting,
    Written,
    Failed,
}

impl fmt::Display for PlaceStage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Pending => "PENDING",
            Self::Crawling => "CRAWLING",
            Self::Aggregating => "AGGREGATING",
            Self::Extracting => "EXTRACTING",
            Self::Written => "WRITTEN",
            Self::Failed => "FAILED",
        })
    }
}

/// Everything a place run needs besides the place itself.
pub struct PipelineContext<'a> {
    pub fetcher: &'a dyn PageFetcher,
    pub crawl: CrawlConfig,
    pub extract: ExtractContext<'a>,
    pub output_root: &'a Path,
    /// Overrides the region code taken from the place.
    pub region: Option<&'a str>,
    pub on_conflict: OnConflict,
}

/// A place that made it to `WRITTEN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedPlace {
    pub record: OutputRecord,
    pub path: PathBuf,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    /// Place id and the reason it failed.
    pub failed: Vec<(String, PlaceError)>,
    pub usage: TokenUsage,
}

/// Parses a place's website, assuming `https://` when no scheme is given.
///
/// # Errors
///
/// Returns [`PlaceError::InvalidWebsite`] unless the website is an http(s) URL with a host.
pub fn parse_website(website: &str) -> Result<Url, PlaceError> {
    let invalid = |reason: String| PlaceError::InvalidWebsite {
        website: website.to_owned(),
        reason,
    };

    let url = match Url::parse(website) {
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{website}")),
        parsed => parsed,
    }
    .map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid("not an http(s) URL".to_owned()));
    }

    Ok(url)
}

/// Region directory for `place`: the override, else the place's state code, else `unknown`.
pub fn region_for<'a>(place: &'a PlaceRecord, region: Option<&'a str>) -> &'a str {
    region
        .or(place.state_code.as_deref())
        .map(str::trim)
        .filter(|region| !region.is_empty())
        .unwrap_or(UNKNOWN_REGION)
}

fn enter(place: &PlaceRecord, stage: PlaceStage) {
    info!("{} ({}): {stage}", place.name, place.id);
}

/// Crawls, aggregates, extracts and writes one place.
///
/// Page fetch failures are absorbed; any other failure stops this place only
/// and leaves no output file behind.
///
/// # Errors
///
/// Returns a [`PlaceError`] if the website is invalid, extraction fails or is
/// rejected, or the record cannot be written.
pub async fn process_place(
    place: &PlaceRecord,
    ctx: &PipelineContext<'_>,
) -> Result<ProcessedPlace, PlaceError> {
    enter(place, PlaceStage::Pending);

    match run_place(place, ctx).await {
        Ok(processed) => {
            enter(place, PlaceStage::Written);
            Ok(processed)
        }
        Err(err) => {
            error!(
                "{} ({}): {} in {}: {err}",
                place.name,
                place.id,
                PlaceStage::Failed,
                err.stage()
            );
            Err(err)
        }
    }
}

async fn run_place(
    place: &PlaceRecord,
    ctx: &PipelineContext<'_>,
) -> Result<ProcessedPlace, PlaceError> {
    enter(place, PlaceStage::Crawling);
    let pages = match place.website() {
        Some(website) => crawl(&parse_website(website)?, &ctx.crawl, ctx.fetcher).await,
        None => {
            warn!("{} has no website, extracting from nothing", place.name);
            Vec::new()
        }
    };

    enter(place, PlaceStage::Aggregating);
    let content = aggregate(pages);
    info!(
        "Collected {} characters from {} pages",
        content.text().len(),
        content.section_count()
    );

    enter(place, PlaceStage::Extracting);
    let record = extract_place(place, &content, &ctx.extract).await?;

    let path = write_record(
        &record,
        &place.name,
        region_for(place, ctx.region),
        ctx.output_root,
        ctx.on_conflict,
    )?;

    Ok(ProcessedPlace { record, path })
}

/// Processes places one after another, continuing past failed places.
pub async fn process_batch(places: &[PlaceRecord], ctx: &PipelineContext<'_>) -> BatchReport {
    let mut report = BatchReport::default();

    for (index, place) in places.iter().enumerate() {
        info!("Processing place {} of {}", index + 1, places.len());

        match process_place(place, ctx).await {
            Ok(processed) => {
                report.usage += processed.record.usage;
                report.written.push(processed.path);
            }
            Err(err) => report.failed.push((place.id.clone(), err)),
        }
    }

    info!(
        "Wrote {} of {} places, {} failed. Token usage - Input: {}, Output: {}, Total: {}",
        report.written.len(),
        places.len(),
        report.failed.len(),
        report.usage.input_tokens,
        report.usage.output_tokens,
        report.usage.total_tokens
    );
    report
}
