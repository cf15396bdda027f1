use std::fs;

use placecrawl::extract::{ExtractionResult, TokenUsage};
use placecrawl::output::{OnConflict, OutputRecord, output_path, sanitize_name, write_record};
use placecrawl::schema::PlaceExtraction;
use placecrawl::OutputWriteError;
use serde_json::Value;
use spectral::assert_that;
use spectral::boolean::BooleanAssertions;

use crate::support::place;

mod support;

fn record() -> OutputRecord {
    OutputRecord::reconcile(
        &place(None),
        ExtractionResult {
            payload: PlaceExtraction {
                id: Some("from-the-model".to_owned()),
                latitude: Some(0.0),
                ..PlaceExtraction::default()
            },
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            },
        },
    )
}

#[test]
fn sanitizes_business_names() {
    let safe = sanitize_name("Kelly's Pub & Grill!!");

    assert_that(&safe).is_equal_to("Kellys_Pub_Grill".to_owned());
    assert_that(&safe.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')).is_true();
    assert_that(&sanitize_name("  Cody's -- Chicago  ")).is_equal_to("Codys-Chicago".to_owned());
    assert_that(&sanitize_name("__Lottie's__ Pub__")).is_equal_to("Lotties_Pub".to_owned());
    assert_that(&sanitize_name("!!! ???")).is_equal_to("unnamed_place".to_owned());
    assert_that(&sanitize_name("")).is_equal_to("unnamed_place".to_owned());
}

#[test]
fn region_cannot_escape_the_output_root() {
    let root = std::path::Path::new("/data/out");

    assert_that(&output_path(root, "../IL", "Kelly's Pub"))
        .is_equal_to(root.join("IL").join("Kellys_Pub.json"));
    assert_that(&output_path(root, "/", "Kelly's Pub"))
        .is_equal_to(root.join("unknown").join("Kellys_Pub.json"));
}

#[test]
fn writes_pretty_camel_case_document() {
    let root = tempfile::tempdir().expect("Expected a temporary directory.");
    let path = write_record(&record(), "Kelly's Pub & Grill!!", "IL", root.path(), OnConflict::Refuse)
        .expect("Expected the record to be written.");

    assert_that(&path).is_equal_to(root.path().join("IL").join("Kellys_Pub_Grill.json"));

    let written = fs::read_to_string(&path).expect("Expected a readable file.");
    assert_that(&written.ends_with("}\n")).is_true();
    assert_that(&written.contains("\n  \"id\": \"ChIJ-kellys-pub\"")).is_true();

    let document: Value = serde_json::from_str(&written).expect("Expected valid JSON.");
    for key in [
        "id",
        "latitude",
        "longitude",
        "promotions",
        "events",
        "menuItems",
        "dailyHours",
        "inputTokens",
        "outputTokens",
        "totalTokens",
        "schemaVersion",
    ] {
        assert_that(&document.get(key).is_some()).is_true();
    }
    assert_that(&document.get("latitude")).is_equal_to(Some(&Value::from(41.921_447)));
    assert_that(&document.get("totalTokens")).is_equal_to(Some(&Value::from(15)));

    let read_back: OutputRecord = serde_json::from_str(&written).expect("Expected an output record.");
    assert_that(&read_back).is_equal_to(record());
}

#[test]
fn refuses_to_overwrite_existing_record() {
    let root = tempfile::tempdir().expect("Expected a temporary directory.");
    let path = write_record(&record(), "Kelly's Pub", "IL", root.path(), OnConflict::Refuse)
        .expect("Expected the first write to succeed.");
    fs::write(&path, "kept").expect("Expected to replace the file content.");

    let result = write_record(&record(), "Kelly's Pub", "IL", root.path(), OnConflict::Refuse);

    assert_that(&matches!(result, Err(OutputWriteError::Conflict { .. }))).is_true();
    assert_that(&fs::read_to_string(&path).expect("Expected a readable file."))
        .is_equal_to("kept".to_owned());
}

#[test]
fn overwrites_when_allowed() {
    let root = tempfile::tempdir().expect("Expected a temporary directory.");
    let path = write_record(&record(), "Kelly's Pub", "IL", root.path(), OnConflict::Refuse)
        .expect("Expected the first write to succeed.");
    fs::write(&path, "stale").expect("Expected to replace the file content.");

    write_record(&record(), "Kelly's Pub", "IL", root.path(), OnConflict::Overwrite)
        .expect("Expected the overwrite to succeed.");

    assert_that(&fs::read_to_string(&path).expect("Expected a readable file.").starts_with('{'))
        .is_true();
}

#[test]
fn conflict_policy_parses_from_cli_values() {
    assert_that(&"prompt".parse::<OnConflict>()).is_equal_to(Ok(OnConflict::Prompt));
    assert_that(&"Overwrite".parse::<OnConflict>()).is_equal_to(Ok(OnConflict::Overwrite));
    assert_that(&"maybe".parse::<OnConflict>().is_err()).is_true();
}

#[test]
fn failed_write_leaves_no_partial_record() {
    let root = tempfile::tempdir().expect("Expected a temporary directory.");
    let region = root.path().join("IL");
    let blocked = region.join("Kellys_Pub.json");
    fs::create_dir_all(&blocked).expect("Expected to create a blocking directory.");

    let result = write_record(&record(), "Kelly's Pub", "IL", root.path(), OnConflict::Overwrite);

    assert_that(&matches!(result, Err(OutputWriteError::Io { .. }))).is_true();
    assert_that(&blocked.is_dir()).is_true();
    let entries = fs::read_dir(&region).expect("Expected a readable region directory.").count();
    assert_that(&entries).is_equal_to(1);
}

#[test]
fn refused_write_keeps_the_directory_clean() {
    let root = tempfile::tempdir().expect("Expected a temporary directory.");
    write_record(&record(), "Kelly's Pub", "IL", root.path(), OnConflict::Refuse)
        .expect("Expected the first write to succeed.");

    let second = write_record(&record(), "Kelly's Pub", "IL", root.path(), OnConflict::Refuse);

    assert_that(&matches!(second, Err(OutputWriteError::Conflict { .. }))).is_true();
    let entries = fs::read_dir(root.path().join("IL"))
        .expect("Expected a readable region directory.")
        .count();
    assert_that(&entries).is_equal_to(1);
}
