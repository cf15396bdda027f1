//! The output module merges an extraction with the place's identity fields and
//! writes the result to `<root>/<region>/<name>.json`.

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use dialoguer::Confirm;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::constants::{UNKNOWN_REGION, UNNAMED_PLACE};
use crate::error::OutputWriteError;
use crate::extract::{ExtractionResult, TokenUsage};
use crate::place::PlaceRecord;
use crate::schema::{BusinessDetails, DailyHours, EXTRACTION_SCHEMA_VERSION, Event, MenuItem, Promotion};

/// The stored record of one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub business: BusinessDetails,
    pub promotions: Vec<Promotion>,
    pub events: Vec<Event>,
    pub menu_items: Vec<MenuItem>,
    pub daily_hours: Vec<DailyHours>,
    #[serde(flatten)]
    pub usage: TokenUsage,
    pub schema_version: u32,
}

impl OutputRecord {
    /// Builds the record from an extraction, taking id and coordinates from
    /// `place` whatever the model returned for them.
    pub fn reconcile(place: &PlaceRecord, result: ExtractionResult) -> Self {
        let ExtractionResult { payload, usage } = result;

        if payload.id.as_ref().is_some_and(|id| *id != place.id)
            || payload.latitude.is_some_and(|latitude| latitude != place.latitude)
            || payload.longitude.is_some_and(|longitude| longitude != place.longitude)
        {
            debug!("Ignoring identity fields returned by the model for {}", place.id);
        }

        Self {
            id: place.id.clone(),
            latitude: place.latitude,
            longitude: place.longitude,
            business: payload.business,
            promotions: payload.promotions,
            events: payload.events,
            menu_items: payload.menu_items,
            daily_hours: payload.daily_hours,
            usage,
            schema_version: EXTRACTION_SCHEMA_VERSION,
        }
    }
}

/// What to do when the output file already exists.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum OnConflict {
    /// Leave the existing file alone and report the conflict.
    #[default]
    Refuse,
    Overwrite,
    /// Ask on the terminal, refusing on "no".
    Prompt,
}

impl std::str::FromStr for OnConflict {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "refuse" => Ok(Self::Refuse),
            "overwrite" => Ok(Self::Overwrite),
            "prompt" => Ok(Self::Prompt),
            _ => Err(format!("Invalid conflict policy: {input}")),
        }
    }
}

/// Turns a business name into a file stem made of alphanumerics, `-` and `_`.
///
/// Other characters are dropped, whitespace runs become `_` and runs of
/// separators collapse into one. Falls back to `unnamed_place`.
pub fn sanitize_name(name: &str) -> String {
    sanitize_or(name, UNNAMED_PLACE)
}

fn sanitize_or(name: &str, fallback: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let joined = kept.split_whitespace().collect::<Vec<_>>().join("_");

    let mut safe = String::with_capacity(joined.len());
    let mut separator_run = String::new();
    for c in joined.chars() {
        if c == '_' || c == '-' {
            separator_run.push(c);
            continue;
        }
        if !separator_run.is_empty() {
            if !safe.is_empty() {
                safe.push(if separator_run.contains('-') { '-' } else { '_' });
            }
            separator_run.clear();
        }
        safe.push(c);
    }

    if safe.is_empty() {
        fallback.to_owned()
    } else {
        safe
    }
}

/// Path the record of `name` in `region` is written to.
pub fn output_path(output_root: &Path, region: &str, name: &str) -> PathBuf {
    output_root
        .join(sanitize_or(region, UNKNOWN_REGION))
        .join(format!("{}.json", sanitize_name(name)))
}

/// Writes `record` as pretty-printed JSON under `<output_root>/<region>/<name>.json`.
///
/// # Errors
///
/// Returns [`OutputWriteError::Conflict`] if the file exists and `on_conflict`
/// does not allow replacing it, or another [`OutputWriteError`] on filesystem
/// or serialization failure.
pub fn write_record(
    record: &OutputRecord,
    name: &str,
    region: &str,
    output_root: &Path,
    on_conflict: OnConflict,
) -> Result<PathBuf, OutputWriteError> {
    let path = output_path(output_root, region, name);
    let mut json = serde_json::to_string_pretty(record)?;
    json.push('\n');

    let directory = path
        .parent()
        .map_or_else(|| output_root.to_path_buf(), Path::to_path_buf);
    let io_error = |source: io::Error| OutputWriteError::Io {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(&directory).map_err(|source| OutputWriteError::Io {
        path: directory.clone(),
        source,
    })?;

    let overwrite = match on_conflict {
        OnConflict::Refuse => false,
        OnConflict::Overwrite => true,
        OnConflict::Prompt => path.exists() && confirm_overwrite(&path)?,
    };

    // The record only appears under its final name once fully written.
    let mut staged = NamedTempFile::new_in(&directory).map_err(io_error)?;
    staged.write_all(json.as_bytes()).map_err(io_error)?;

    let persisted = if overwrite {
        staged.persist(&path)
    } else {
        staged.persist_noclobber(&path)
    };
    persisted.map_err(|e| {
        if e.error.kind() == ErrorKind::AlreadyExists {
            OutputWriteError::Conflict { path: path.clone() }
        } else {
            io_error(e.error)
        }
    })?;

    info!("Saved {}", path.display());
    Ok(path)
}

fn confirm_overwrite(path: &Path) -> Result<bool, OutputWriteError> {
    Confirm::new()
        .with_prompt(format!(
            "File {} exists. Replace existing content?",
            path.display()
        ))
        .default(false)
        .interact()
        .map_err(|e| OutputWriteError::Prompt(e.to_string()))
}
