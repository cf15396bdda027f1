use std::time::Duration;

pub const MODEL_API_KEY_ENV_NAME: &str = "PLACECRAWL_MODEL_API_KEY";

pub const DEFAULT_USER_AGENT: &str = "PlaceCrawl Bot";
pub const DEFAULT_MAX_PAGES: usize = 10;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const REDIRECT_LIMIT: usize = 3;

/// Directory used when neither the caller nor the place supplies a region code.
pub const UNKNOWN_REGION: &str = "unknown";
/// File stem used when a business name sanitizes to nothing.
pub const UNNAMED_PLACE: &str = "unnamed_place";

pub(crate) const THINK_STRIPPER: &str = r"<think>[\s\S]*</think>\s*";
pub(crate) const CODE_FENCE_STRIPPER: &str = r"^\s*```(?:json)?\s*([\s\S]*?)\s*```\s*$";

pub(crate) const DEFAULT_PROMPT_TEMPLATE: &str = r#"
You will see the text of a business website. Each page starts with a line "=== <page url> ===".
Extract the business details, current promotions (happy hours, specials), upcoming events,
menu items with prices and the regular opening hours for each day of the week.
Answer with a single JSON object matching the provided schema and nothing else.
Use null for unknown scalar values and empty arrays when nothing of a kind is listed.
Leave "id", "latitude" and "longitude" null: they are supplied elsewhere.
Hours are 24-hour clock values: hours 0-23, minutes 0-59. Days are English weekday names.
Do not invent information that is not present in the text."#;
