use jsonschema::Validator;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::models::{QueryType, ScrapedRecord};

/// Validates scraped records against per-type JSON Schemas before they are
/// deduplicated and stored.
///
/// Records are checked in their serialized (camelCase) form, so the schemas
/// describe exactly what the store receives.
pub struct RecordValidator {
    vehicle: Validator,
    event: Validator,
    article: Validator,
}

impl std::fmt::Debug for RecordValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordValidator").finish_non_exhaustive()
    }
}

impl RecordValidator {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            vehicle: compile("vehicle", &vehicle_schema())?,
            event: compile("event", &event_schema())?,
            article: compile("article", &article_schema())?,
        })
    }

    /// Check one record. On failure returns a human-readable reason listing
    /// every violated constraint.
    pub fn validate(&self, record: &ScrapedRecord) -> Result<(), String> {
        let instance = serde_json::to_value(record).map_err(|e| e.to_string())?;
        let validator = match record.record_type {
            QueryType::Vehicle => &self.vehicle,
            QueryType::Event => &self.event,
            QueryType::Article | QueryType::General => &self.article,
        };
        let errors: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

fn compile(name: &str, schema: &Value) -> Result<Validator, AppError> {
    jsonschema::validator_for(schema)
        .map_err(|e| AppError::ConfigError(format!("Invalid {name} record schema: {e}")))
}

fn base_properties() -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    props.insert("title".into(), json!({"type": "string", "minLength": 1}));
    props.insert("source".into(), json!({"type": "string", "minLength": 1}));
    props.insert("url".into(), json!({"type": "string", "pattern": "^https?://"}));
    props
}

fn vehicle_schema() -> Value {
    let mut props = base_properties();
    props.insert(
        "year".into(),
        json!({"type": "integer", "minimum": 1900, "maximum": 2100}),
    );
    props.insert("price".into(), json!({"type": "integer", "exclusiveMinimum": 0}));
    props.insert("make".into(), json!({"type": "string", "minLength": 1}));
    props.insert("model".into(), json!({"type": "string", "minLength": 1}));
    json!({
        "type": "object",
        "required": ["type", "title", "source"],
        "properties": props,
    })
}

fn event_schema() -> Value {
    let mut props = base_properties();
    props.insert("date".into(), json!({"type": "string", "minLength": 1}));
    json!({
        "type": "object",
        "required": ["type", "title", "source"],
        "properties": props,
    })
}

fn article_schema() -> Value {
    json!({
        "type": "object",
        "required": ["type", "title", "source"],
        "properties": base_properties(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(title: &str) -> ScrapedRecord {
        ScrapedRecord::new(QueryType::Vehicle, title, "ClassicCars.com")
            .with_url("https://classiccars.com/listings/view/1")
    }

    #[test]
    fn accepts_well_formed_vehicle() {
        let v = RecordValidator::new().unwrap();
        let mut record = vehicle("1967 Ford Mustang");
        record.year = Some(1967);
        record.price = Some(45000);
        assert!(v.validate(&record).is_ok());
    }

    #[test]
    fn rejects_empty_title() {
        let v = RecordValidator::new().unwrap();
        assert!(v.validate(&vehicle("")).is_err());
    }

    #[test]
    fn rejects_out_of_range_year_and_zero_price() {
        let v = RecordValidator::new().unwrap();
        let mut record = vehicle("Some car");
        record.year = Some(1850);
        assert!(v.validate(&record).is_err());

        let mut record = vehicle("Some car");
        record.price = Some(0);
        assert!(v.validate(&record).is_err());
    }

    #[test]
    fn rejects_non_http_url() {
        let v = RecordValidator::new().unwrap();
        let record = ScrapedRecord::new(QueryType::Article, "Barn find stories", "jina")
            .with_url("javascript:alert(1)");
        let reason = v.validate(&record).unwrap_err();
        assert!(!reason.is_empty());
    }

    #[test]
    fn general_records_use_article_rules() {
        let v = RecordValidator::new().unwrap();
        let record = ScrapedRecord::new(QueryType::General, "Classic car insurance", "brave")
            .with_url("https://example.com/insurance");
        assert!(v.validate(&record).is_ok());
    }
}
