//! The placecrawl library crawls a business website and turns it into a
//! structured place record using an LLM constrained by a fixed schema.
//!
//! The pipeline per place is crawl → aggregate → extract → write, see [`pipeline`].

pub mod aggregate;
pub mod constants;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod place;
pub mod schema;

pub use aggregate::{AggregatedContent, aggregate};
pub use crawl::{CrawlConfig, crawl};
pub use error::{FetchError, OutputWriteError, PlaceError, SchemaValidationError, ServiceError};
pub use extract::{ExtractContext, Extraction, ExtractionResult, TokenUsage, extract};
pub use fetch::{HttpFetcher, PageContent, PageFetcher};
pub use output::{OnConflict, OutputRecord, write_record};
pub use pipeline::{BatchReport, PipelineContext, PlaceStage, ProcessedPlace, process_batch, process_place};
pub use place::{PlaceRecord, load_places};
