//! Text cleanup and vehicle field inference for extracted records.

use crate::models::{QueryType, ScrapedRecord};

/// Makes recognised when inferring make/model from a listing title.
/// Multi-word makes come before their single-word prefixes.
const KNOWN_MAKES: &[&str] = &[
    "Alfa Romeo",
    "Aston Martin",
    "Austin-Healey",
    "Land Rover",
    "Mercedes-Benz",
    "AMC",
    "Buick",
    "Cadillac",
    "Chevrolet",
    "Chrysler",
    "Datsun",
    "DeSoto",
    "Dodge",
    "Ferrari",
    "Ford",
    "GMC",
    "Hudson",
    "Jaguar",
    "Jeep",
    "Lincoln",
    "Mercury",
    "MG",
    "Nash",
    "Oldsmobile",
    "Packard",
    "Plymouth",
    "Pontiac",
    "Porsche",
    "Shelby",
    "Studebaker",
    "Triumph",
    "Volkswagen",
];

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First plausible model year (1900-2099) appearing as a standalone token.
pub fn parse_year(text: &str) -> Option<i32> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|tok| tok.len() == 4)
        .filter_map(|tok| tok.parse::<i32>().ok())
        .find(|y| (1900..=2099).contains(y))
}

/// Parse a price like `$45,500` or `USD 12000.00` into whole dollars.
///
/// Returns `None` for text without digits or for a zero amount
/// ("Call for price", "$0").
pub fn parse_price(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    match digits.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(price) => Some(price),
    }
}

/// Infer `(make, model)` from a vehicle title.
///
/// A known make anywhere in the title wins and the following word is the model.
/// Otherwise the two words after the model year are used.
pub fn extract_make_model(title: &str) -> (Option<String>, Option<String>) {
    let words: Vec<&str> = title
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-'))
        .filter(|w| !w.is_empty())
        .collect();

    for make in KNOWN_MAKES {
        let make_words: Vec<&str> = make.split_whitespace().collect();
        let found = words.windows(make_words.len()).position(|window| {
            window
                .iter()
                .zip(&make_words)
                .all(|(w, m)| w.eq_ignore_ascii_case(m))
        });
        if let Some(i) = found {
            let model = words.get(i + make_words.len()).map(|w| (*w).to_string());
            return (Some((*make).to_string()), model);
        }
    }

    let year_idx = words
        .iter()
        .position(|w| w.len() == 4 && parse_year(w).is_some());
    match year_idx {
        Some(i) => (
            words.get(i + 1).map(|w| (*w).to_string()),
            words.get(i + 2).map(|w| (*w).to_string()),
        ),
        None => (None, None),
    }
}

/// Clean text fields and, for vehicles, fill year/make/model/price from the
/// title and price text when the extractor left them empty.
pub fn normalize_record(mut record: ScrapedRecord) -> ScrapedRecord {
    record.title = clean_text(&record.title);
    record.location = record.location.map(|s| clean_text(&s)).filter(|s| !s.is_empty());
    record.description = record
        .description
        .map(|s| clean_text(&s))
        .filter(|s| !s.is_empty());
    record.url = record.url.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    if record.record_type == QueryType::Vehicle {
        if record.year.is_none() {
            record.year = parse_year(&record.title);
        }
        if record.make.is_none() || record.model.is_none() {
            let (make, model) = extract_make_model(&record.title);
            record.make = record.make.or(make);
            record.model = record.model.or(model);
        }
        if record.price.is_none() {
            record.price = record.price_text.as_deref().and_then(parse_price);
        }
    }
    record
}
