//! placecrawl is a CLI tool that crawls the website of each place in a place
//! data file and writes a structured record per place, extracted by an LLM.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Builder;
use llm::builder::{LLMBackend, LLMBuilder};
use log::{LevelFilter, error, info};
use url::Url;

use placecrawl::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_PAGES, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT,
    MODEL_API_KEY_ENV_NAME,
};
use placecrawl::extract::{rate_limiter, structured_output_format};
use placecrawl::{
    CrawlConfig, ExtractContext, HttpFetcher, OnConflict, PipelineContext, load_places,
    process_batch,
};

/// A CLI tool to extract structured place records from business websites
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, short, action = clap::ArgAction::Count, help = "Output v(v...)erbosity: error (0), warn (1), info (2), debug (3), trace (4)", global = true, default_value_t = 2)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl each place's website and write one extracted record per place
    Extract {
        /// Path to a JSON file with one place or a list of places
        place_file: PathBuf,
        /// Directory the records are written under, one subdirectory per region
        output_root: PathBuf,
        /// URL of the LLM model to use, e.g. openai://gpt-4o-mini
        model: String,
        /// Region code, defaults to each place's state code
        #[arg(long, short = 'g')]
        region: Option<String>,
        /// Maximum number of pages crawled per website
        #[arg(long, short = 'p', default_value_t = DEFAULT_MAX_PAGES)]
        max_pages: usize,
        /// Number of concurrent page requests
        #[arg(long, short, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Per-request timeout in seconds
        #[arg(long, short, default_value_t = DEFAULT_TIMEOUT.as_secs())]
        timeout: u64,
        /// What to do when a record already exists: "refuse" (default), "overwrite" or "prompt"
        #[arg(long, default_value = "refuse")]
        on_conflict: OnConflict,
        /// Path to the file with a prompt template
        #[arg(long)]
        prompt_file: Option<PathBuf>,
        /// Rate limit: extraction requests per minute (default: no limit)
        #[arg(long, short = 'r')]
        rpm: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    Builder::new()
        .filter_level(match cli.verbose {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            3 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        })
        .init();

    match cli.command {
        Command::Extract {
            place_file,
            output_root,
            model,
            region,
            max_pages,
            concurrency,
            timeout,
            on_conflict,
            prompt_file,
            rpm,
        } => {
            let failed = handle_extract_command(ExtractArgs {
                place_file,
                output_root,
                model,
                region,
                crawl: CrawlConfig {
                    max_pages,
                    concurrency,
                },
                timeout: Duration::from_secs(timeout),
                on_conflict,
                prompt_file,
                rpm,
            })
            .await?;

            if failed > 0 {
                anyhow::bail!("{failed} places failed");
            }
            Ok(())
        }
    }
}

struct ExtractArgs {
    place_file: PathBuf,
    output_root: PathBuf,
    model: String,
    region: Option<String>,
    crawl: CrawlConfig,
    timeout: Duration,
    on_conflict: OnConflict,
    prompt_file: Option<PathBuf>,
    rpm: Option<u32>,
}

/// Returns the number of places that failed.
async fn handle_extract_command(args: ExtractArgs) -> Result<usize> {
    let places = load_places(&args.place_file)?;
    let model = model_builder(&args.model)?
        .schema(structured_output_format())
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build LLM model: {}", e))?;

    let prompt_template = match &args.prompt_file {
        Some(file) => Some(
            fs::read_to_string(file)
                .with_context(|| format!("Failed to read prompt file: {}", file.display()))?,
        ),
        None => None,
    };
    let limiter = args.rpm.and_then(rate_limiter);
    let fetcher = HttpFetcher::new(args.timeout, DEFAULT_USER_AGENT)
        .context("Unable to create HTTP client.")?;

    let ctx = PipelineContext {
        fetcher: &fetcher,
        crawl: args.crawl,
        extract: ExtractContext {
            model: model.as_ref(),
            prompt_template: prompt_template.as_deref(),
            rate_limiter: limiter.as_ref(),
        },
        output_root: &args.output_root,
        region: args.region.as_deref(),
        on_conflict: args.on_conflict,
    };

    let report = process_batch(&places, &ctx).await;
    for (id, reason) in &report.failed {
        error!("Place {id} failed: {reason}");
    }

    Ok(report.failed.len())
}

/// Resolves `backend://model[:tag]` into an LLM builder.
fn model_builder(model: &str) -> Result<LLMBuilder> {
    let model_url = Url::parse(model).map_err(|e| anyhow::anyhow!("Invalid model URL: {}", e))?;
    let llm_builder = LLMBuilder::new()
        .backend(
            LLMBackend::from_str(model_url.scheme())
                .map_err(|e| anyhow::anyhow!("Invalid LLM backend: {}", e))?,
        )
        .model(
            [
                model_url
                    .host_str()
                    .context("Specify model name as host URL.")?,
                model_url.username(),
            ]
            .iter()
            .filter(|x| !x.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(":"),
        );

    Ok(match std::env::var(MODEL_API_KEY_ENV_NAME) {
        Ok(model_key) => {
            info!("API key is provided via {MODEL_API_KEY_ENV_NAME}");
            llm_builder.api_key(model_key)
        }
        Err(err) => {
            info!("{err} while providing api key");
            llm_builder
        }
    })
}
