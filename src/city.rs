//! City name folding and fuzzy matching.
//!
//! Free text is folded to a bare key (no diacritics, lowercase ASCII
//! letters and digits), aliases collapse onto a canonical key, and the
//! canonical key maps back to a display name for outbound calls.

use std::collections::HashMap;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Immutable alias and display tables, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct CityAliases {
    aliases: HashMap<String, String>,
    display: HashMap<String, String>,
}

impl CityAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canonical key, its display name, and the keys that fold onto it.
    /// Every key is normalized on the way in, so callers may pass raw text.
    pub fn with_city(mut self, canonical: &str, display: &str, aliases: &[&str]) -> Self {
        let canonical = CityNormalizer::normalize(canonical);
        for alias in aliases.iter().copied().chain(std::iter::once(canonical.as_str())) {
            let key = CityNormalizer::normalize(alias);
            if !key.is_empty() {
                self.aliases.insert(key, canonical.clone());
            }
        }
        self.display.insert(canonical, display.to_string());
        self
    }

    /// Major Vietnamese destinations and their common abbreviations.
    pub fn vietnam() -> Self {
        Self::new()
            .with_city("danang", "Đà Nẵng", &["dn", "danag", "dng", "da", "dan", "danan"])
            .with_city("hanoi", "Hà Nội", &["hn"])
            .with_city("hochiminh", "Hồ Chí Minh", &["tphcm", "hcm", "saigon", "sg", "tphochiminh"])
            .with_city("nhatrang", "Nha Trang", &["nt"])
            .with_city("dalat", "Đà Lạt", &["dl"])
            .with_city("hue", "Huế", &[])
            .with_city("cantho", "Cần Thơ", &["ct"])
            .with_city("quynhon", "Quy Nhơn", &["qn"])
            .with_city("phuquoc", "Phú Quốc", &["pq"])
            .with_city("vungtau", "Vũng Tàu", &["vt"])
            .with_city("hoian", "Hội An", &[])
            .with_city("phanthiet", "Phan Thiết", &["pt", "muine"])
            .with_city("halong", "Hạ Long", &["hl"])
            .with_city("sapa", "Sa Pa", &["sp"])
            .with_city("bienhoa", "Biên Hòa", &[])
            .with_city("rachgia", "Rạch Giá", &[])
    }
}

#[derive(Debug, Clone)]
pub struct CityNormalizer {
    table: CityAliases,
}

impl Default for CityNormalizer {
    fn default() -> Self {
        Self::new(CityAliases::vietnam())
    }
}

impl CityNormalizer {
    pub fn new(table: CityAliases) -> Self {
        Self { table }
    }

    /// Fold free text to a bare key. Idempotent.
    pub fn normalize(text: &str) -> String {
        text.nfd()
            .filter(|c| !is_combining_mark(*c))
            .map(|c| match c {
                'đ' | 'Đ' => 'd',
                other => other,
            })
            .flat_map(char::to_lowercase)
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect()
    }

    /// Alias lookup on an already-normalized key; unknown keys pass through.
    pub fn canonicalize(&self, key: &str) -> String {
        self.table
            .aliases
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Normalize then canonicalize.
    pub fn canonical_of(&self, text: &str) -> String {
        self.canonicalize(&Self::normalize(text))
    }

    /// Human-readable name for outbound search, falling back to the input.
    pub fn display_name(&self, text: &str) -> String {
        let canonical = self.canonical_of(text);
        match self.table.display.get(&canonical) {
            Some(name) => name.clone(),
            None => text.to_string(),
        }
    }

    /// Does an establishment's city satisfy a user's query?
    ///
    /// An empty query matches everything. Otherwise the canonical keys must be
    /// equal or one must contain the other. An establishment without a
    /// usable city only matches the empty query.
    pub fn matches(&self, establishment_city: &str, query: &str) -> bool {
        let wanted = self.canonical_of(query);
        if wanted.is_empty() {
            return true;
        }
        let have = self.canonical_of(establishment_city);
        if have.is_empty() {
            return false;
        }
        have == wanted || have.contains(&wanted) || wanted.contains(&have)
    }
}
