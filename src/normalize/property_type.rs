//! Property type classification

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Studio,
    Apartment,
    Villa,
    House,
    Land,
    Office,
    Commercial,
    Garage,
    Storage,
    Other,
}

impl PropertyType {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyType::Studio => "studio",
            PropertyType::Apartment => "apartment",
            PropertyType::Villa => "villa",
            PropertyType::House => "house",
            PropertyType::Land => "land",
            PropertyType::Office => "office",
            PropertyType::Commercial => "commercial",
            PropertyType::Garage => "garage",
            PropertyType::Storage => "storage",
            PropertyType::Other => "other",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Tested in order; studio terms overlap apartment terms.
static PATTERNS: LazyLock<Vec<(PropertyType, Regex)>> = LazyLock::new(|| {
    [
        (PropertyType::Studio, r"\b(studio|studios|estudio|monolocale|kitchenette|bedsit)\b"),
        (
            PropertyType::Apartment,
            concat!(
                r"\b(apartment|apartments|apt|flat|flats|condo|condominium|penthouse|duplex|loft",
                r"|piso|pisos|apartamento|atico|departamento|appartement|wohnung|appartamento",
                r"|attico|bilocale|trilocale)\b",
            ),
        ),
        (PropertyType::Villa, r"\b(villa|villas|chalet|quinta|mansion)\b"),
        (
            PropertyType::House,
            concat!(
                r"\b(house|houses|home|bungalow|cottage|townhouse|detached|semi-detached|terraced",
                r"|casa|casas|adosado|pareado|maison|haus|einfamilienhaus|reihenhaus|moradia",
                r"|residence)\b",
            ),
        ),
        (
            PropertyType::Land,
            concat!(
                r"\b(land|plot|plots|lot|terreno|terrenos|solar|parcela|rustica|terrain",
                r"|grundstuck|terreni)\b",
            ),
        ),
        (
            PropertyType::Office,
            r"\b(office|offices|oficina|oficinas|bureau|bureaux|buro|ufficio)\b",
        ),
        (
            PropertyType::Commercial,
            concat!(
                r"\b(commercial|retail|shop|store|warehouse|industrial|local|locales|nave",
                r"|comercial|commerce|negozio|gewerbe)\b",
            ),
        ),
        (
            PropertyType::Garage,
            r"\b(garage|garages|parking|garaje|garajes|plaza de garaje|box|stellplatz)\b",
        ),
        (
            PropertyType::Storage,
            r"\b(storage|storeroom|trastero|trasteros|cave|cantina|lagerraum)\b",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| {
        let regex = Regex::new(&format!("(?i){pattern}")).expect("property type regex");
        (kind, regex)
    })
    .collect()
});

/// Canonical decomposition with combining marks removed.
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// First matching category for a free-text property type.
pub fn normalize_property_type(raw: &str) -> PropertyType {
    let folded = strip_diacritics(raw);
    PATTERNS
        .iter()
        .find(|(_, regex)| regex.is_match(&folded))
        .map(|(kind, _)| *kind)
        .unwrap_or(PropertyType::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accented_terms_match() {
        assert_eq!(normalize_property_type("Ático en Madrid"), PropertyType::Apartment);
        assert_eq!(normalize_property_type("Grundstück"), PropertyType::Land);
        assert_eq!(normalize_property_type("Maison de village"), PropertyType::House);
    }

    #[test]
    fn test_specific_before_broad() {
        assert_eq!(normalize_property_type("Studio apartment"), PropertyType::Studio);
        assert_eq!(normalize_property_type("Villa with guest house"), PropertyType::Villa);
    }

    #[test]
    fn test_word_boundaries_and_other() {
        assert_eq!(normalize_property_type("Flat"), PropertyType::Apartment);
        assert_eq!(normalize_property_type("Flatland"), PropertyType::Other);
        assert_eq!(normalize_property_type(""), PropertyType::Other);
        assert_eq!(PropertyType::Garage.to_string(), "garage");
    }

    #[test]
    fn test_strip_diacritics() {
        assert_eq!(strip_diacritics("Cañada Vílla"), "Canada Villa");
    }
}
