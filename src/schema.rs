//! The closed output contract of the extraction engine and its JSON schema.

use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaValidationError;

/// Bumped whenever a field is added, removed or changes meaning.
pub const EXTRACTION_SCHEMA_VERSION: u32 = 1;

/// Everything the model is asked to extract from a website.
///
/// Unknown fields are rejected; absent or null fields fall back to `None` or an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlaceExtraction {
    /// Always null, the place identifier is supplied by the caller.
    #[serde(default)]
    pub id: Option<String>,
    /// Always null, coordinates are supplied by the caller.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Always null, coordinates are supplied by the caller.
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub business: BusinessDetails,
    /// Recurring deals such as happy hours or daily specials.
    #[serde(default)]
    pub promotions: Vec<Promotion>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub menu_items: Vec<MenuItem>,
    /// Regular opening hours, one entry per opening period.
    #[serde(default)]
    pub daily_hours: Vec<DailyHours>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BusinessDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// Two letter state or region code.
    #[serde(default)]
    pub state_code: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    /// Kind of venue, e.g. "pub" or "cafe".
    #[serde(default)]
    pub amenity: Option<String>,
    #[serde(default)]
    pub cuisine: Vec<String>,
    /// Relative price level, e.g. "$$".
    #[serde(default)]
    pub price_level: Option<String>,
    /// Rating between 0 and 5.
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub primary_type: Option<String>,
    #[serde(default)]
    pub secondary_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

/// One opening period, 24-hour clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DailyHours {
    pub day: Weekday,
    /// 0-23
    pub open_hour: u8,
    /// 0-59
    #[serde(default)]
    pub open_minute: Option<u8>,
    /// 0-23
    pub close_hour: u8,
    /// 0-59
    #[serde(default)]
    pub close_minute: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Promotion {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// When the promotion applies.
    #[serde(default)]
    pub hours: Vec<DailyHours>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Event {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// ISO 8601 date or date-time when known, otherwise the text as written.
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub hours: Vec<DailyHours>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MenuItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
}

impl DailyHours {
    fn check(&self, path: &str, violations: &mut Vec<String>) {
        if self.open_hour > 23 {
            violations.push(format!("{path}.openHour {} is not within 0-23", self.open_hour));
        }
        if self.close_hour > 23 {
            violations.push(format!("{path}.closeHour {} is not within 0-23", self.close_hour));
        }
        if let Some(minute) = self.open_minute.filter(|minute| *minute > 59) {
            violations.push(format!("{path}.openMinute {minute} is not within 0-59"));
        }
        if let Some(minute) = self.close_minute.filter(|minute| *minute > 59) {
            violations.push(format!("{path}.closeMinute {minute} is not within 0-59"));
        }
    }
}

fn check_hours(hours: &[DailyHours], path: &str, violations: &mut Vec<String>) {
    for (index, entry) in hours.iter().enumerate() {
        entry.check(&format!("{path}[{index}]"), violations);
    }
}

impl PlaceExtraction {
    /// Checks the value ranges that the JSON shape alone cannot express.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaValidationError`] listing every violation found.
    pub fn validate(&self) -> Result<(), SchemaValidationError> {
        let mut violations = Vec::new();

        if let Some(rating) = self.business.rating
            && !(0.0..=5.0).contains(&rating)
        {
            violations.push(format!("business.rating {rating} is not within 0-5"));
        }

        check_hours(&self.daily_hours, "dailyHours", &mut violations);
        for (index, promotion) in self.promotions.iter().enumerate() {
            check_hours(&promotion.hours, &format!("promotions[{index}].hours"), &mut violations);
        }
        for (index, event) in self.events.iter().enumerate() {
            if event.start_date.trim().is_empty() {
                violations.push(format!("events[{index}].startDate is empty"));
            }
            check_hours(&event.hours, &format!("events[{index}].hours"), &mut violations);
        }
        for (index, item) in self.menu_items.iter().enumerate() {
            if let Some(price) = item.price
                && !(price.is_finite() && price >= 0.0)
            {
                violations.push(format!("menuItems[{index}].price {price} is not a valid price"));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaValidationError::new(violations.join("; ")))
        }
    }
}

/// Parses and validates a raw model payload. Nothing is returned unless the
/// whole payload conforms.
///
/// # Errors
///
/// Returns a [`SchemaValidationError`] if the payload is not a JSON object of the
/// expected shape or breaks a value range.
pub fn parse_payload(payload: &str) -> Result<PlaceExtraction, SchemaValidationError> {
    let mut value: Value = serde_json::from_str(payload)
        .map_err(|e| SchemaValidationError::new(format!("payload is not JSON: {e}")))?;

    if !value.is_object() {
        return Err(SchemaValidationError::new("payload is not a JSON object"));
    }

    drop_nulls(&mut value);
    let extraction: PlaceExtraction = serde_json::from_value(value)
        .map_err(|e| SchemaValidationError::new(e.to_string()))?;
    extraction.validate()?;

    Ok(extraction)
}

/// Removes null members so that serde defaults apply to them.
fn drop_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, member| !member.is_null());
            map.values_mut().for_each(drop_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(drop_nulls),
        _ => {}
    }
}

/// JSON schema of [`PlaceExtraction`] in the strict form structured-output APIs
/// expect: closed objects, every property required, no `$ref`s.
pub fn extraction_schema() -> Value {
    let schema = schema_for!(PlaceExtraction);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    let definitions = value.get("definitions").cloned().unwrap_or(Value::Null);
    inline_refs(&mut value, &definitions);
    close_objects(&mut value);

    if let Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }

    value
}

/// Keywords schemars emits that strict structured-output endpoints reject.
const UNSUPPORTED_KEYWORDS: [&str; 4] = ["default", "format", "minimum", "maximum"];

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for keyword in UNSUPPORTED_KEYWORDS {
                map.remove(keyword);
            }

            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".to_owned(), Value::Bool(false));

                let required: Vec<Value> = map
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|properties| properties.keys().cloned().map(Value::String).collect())
                    .unwrap_or_default();
                map.insert("required".to_owned(), Value::Array(required));
            }

            for (key, member) in map.iter_mut() {
                // Property names are not keywords, only their schemas are closed.
                if key == "properties"
                    && let Value::Object(properties) = member
                {
                    properties.values_mut().for_each(close_objects);
                } else {
                    close_objects(member);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let referenced = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|reference| reference.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(mut definition) = referenced {
                inline_refs(&mut definition, definitions);
                *value = definition;
                return;
            }

            // schemars wraps documented refs as `allOf: [ref]`
            let single = match map.get("allOf").and_then(Value::as_array) {
                Some(all_of) if all_of.len() == 1 => all_of.first().cloned(),
                _ => None,
            };
            if let Some(mut inner) = single {
                inline_refs(&mut inner, definitions);
                if let (Value::Object(inner), Value::Object(outer)) = (&mut inner, &*value) {
                    for (key, member) in outer {
                        if key != "allOf" {
                            inner.entry(key.clone()).or_insert_with(|| member.clone());
                        }
                    }
                }
                *value = inner;
                return;
            }

            map.values_mut()
                .for_each(|member| inline_refs(member, definitions));
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| inline_refs(item, definitions)),
        _ => {}
    }
}
