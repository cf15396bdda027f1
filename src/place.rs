//! Input place records as produced by the normalization step.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A normalized place. Only the fields the pipeline reads are modelled; other
/// keys in the input document are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    #[serde(alias = "google_places_id")]
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default, alias = "stateCode")]
    pub state_code: Option<String>,
}

impl PlaceRecord {
    /// Returns the website if it is present and not blank.
    pub fn website(&self) -> Option<&str> {
        self.website
            .as_deref()
            .map(str::trim)
            .filter(|website| !website.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlaceFile {
    One(PlaceRecord),
    Many(Vec<PlaceRecord>),
}

/// Parses a place document holding either one place or an array of places.
///
/// # Errors
///
/// Returns an error if the document is not a place object or an array of them.
pub fn parse_places(json: &str) -> Result<Vec<PlaceRecord>> {
    let file: PlaceFile =
        serde_json::from_str(json).context("Place data is neither a place nor a list of places")?;

    Ok(match file {
        PlaceFile::One(place) => vec![place],
        PlaceFile::Many(places) => places,
    })
}

/// Loads places from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_places(path: &Path) -> Result<Vec<PlaceRecord>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read place data file: {}", path.display()))?;

    parse_places(&json).with_context(|| format!("Invalid place data in {}", path.display()))
}
