//! Typed search parameters built from the loosely-typed map that travels
//! between the client, the quiz step and the semantic search service.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::engine::EngineError;
use crate::model::{EstablishmentType, Price};

pub type ParamMap = BTreeMap<String, Value>;

pub const CITY: &str = "city";
pub const CHECK_IN_DATE: &str = "check_in_date";
pub const MAX_PRICE: &str = "max_price";
pub const NUM_GUESTS: &str = "num_guests";
pub const TRAVEL_COMPANION: &str = "travel_companion";
pub const HAS_BALCONY: &str = "has_balcony";
pub const ESTABLISHMENT_TYPE: &str = "establishment_type";
pub const AMENITIES_PRIORITY: &str = "amenities_priority";
pub const STYLE_VIBE: &str = "style_vibe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub city: Option<String>,
    pub check_in: NaiveDate,
    pub max_price: Price,
    pub num_guests: Option<u32>,
    pub has_balcony: Option<bool>,
    pub establishment_type: Option<EstablishmentType>,
    /// Lowercased, trimmed, in priority order.
    pub amenities: Vec<String>,
}

impl SearchParams {
    pub fn new(check_in: NaiveDate, max_price: Price) -> Self {
        Self {
            city: None,
            check_in,
            max_price,
            num_guests: None,
            has_balcony: None,
            establishment_type: None,
            amenities: Vec::new(),
        }
    }

    /// Parse a completed parameter map. Every present-but-malformed value is
    /// a validation error; nothing silently falls back to a default.
    pub fn from_map(map: &ParamMap) -> Result<Self, EngineError> {
        let check_in = match text(map, CHECK_IN_DATE) {
            Some(raw) => parse_date(&raw)?,
            None => return Err(missing(CHECK_IN_DATE)),
        };
        let max_price = match text(map, MAX_PRICE) {
            Some(raw) => parse_price(&raw)?,
            None => return Err(missing(MAX_PRICE)),
        };

        let num_guests = match text(map, NUM_GUESTS) {
            Some(raw) => Some(parse_guests(&raw)?),
            None => match text(map, TRAVEL_COMPANION) {
                Some(companion) => companion_party_size(&companion),
                None => None,
            },
        };

        let has_balcony = text(map, HAS_BALCONY).map(|raw| parse_flag(HAS_BALCONY, &raw)).transpose()?;

        let establishment_type = text(map, ESTABLISHMENT_TYPE)
            .or_else(|| text(map, "type"))
            .map(|raw| {
                raw.parse::<EstablishmentType>()
                    .map_err(|e| EngineError::Validation(e.to_string()))
            })
            .transpose()?;

        let amenities = text(map, AMENITIES_PRIORITY)
            .map(|raw| split_amenities(&raw))
            .unwrap_or_default();

        Ok(Self {
            city: text(map, CITY),
            check_in,
            max_price,
            num_guests,
            has_balcony,
            establishment_type,
            amenities,
        })
    }
}

/// A trimmed, non-empty textual view of a map entry.
pub fn text(map: &ParamMap, key: &str) -> Option<String> {
    let raw = match map.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Null | Value::Object(_) => return None,
    };
    if raw.is_empty() { None } else { Some(raw) }
}

/// Present with a non-blank value.
pub fn has(map: &ParamMap, key: &str) -> bool {
    text(map, key).is_some()
}

fn missing(key: &str) -> EngineError {
    EngineError::Validation(format!("missing search parameter: {key}"))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::Validation(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

fn parse_price(raw: &str) -> Result<Price, EngineError> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '_' | ',')).collect();
    let price = match cleaned.parse::<Price>() {
        Ok(p) => p,
        // Fractional budgets are accepted and truncated to whole units.
        Err(_) => cleaned
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as Price)
            .ok_or_else(|| EngineError::Validation(format!("invalid max_price '{raw}'")))?,
    };
    if price < 0 {
        return Err(EngineError::Validation(format!("max_price must not be negative, got {price}")));
    }
    Ok(price)
}

fn parse_guests(raw: &str) -> Result<u32, EngineError> {
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(EngineError::Validation(format!("invalid num_guests '{raw}'"))),
    }
}

/// Boolean-ish flags: yes/true/1 and no/false/0, case-insensitive.
pub fn parse_flag(key: &str, raw: &str) -> Result<bool, EngineError> {
    match raw.trim().to_lowercase().as_str() {
        "yes" | "true" | "1" | "y" => Ok(true),
        "no" | "false" | "0" | "n" => Ok(false),
        _ => Err(EngineError::Validation(format!("invalid {key} '{raw}', expected yes or no"))),
    }
}

fn split_amenities(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect()
}

/// Party size implied by a travel companion answer.
pub fn companion_party_size(companion: &str) -> Option<u32> {
    match companion.trim().to_lowercase().as_str() {
        "single" | "solo" | "alone" => Some(1),
        "couple" => Some(2),
        "friends" => Some(3),
        "family" => Some(4),
        _ => None,
    }
}
