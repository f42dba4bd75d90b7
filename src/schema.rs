//! Split a flat property record into long-lived asset data and
//! short-lived listing data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Physical and geographic attributes of the property itself.
pub const ASSET_FIELDS: &[&str] = &[
    "address_string",
    "street_address",
    "street_name",
    "street_number",
    "postal_code",
    "city",
    "province",
    "region",
    "country",
    "latitude",
    "longitude",
    "property_type",
    "property_type_raw",
    "count_bedrooms",
    "count_bathrooms",
    "count_toilets",
    "count_garages",
    "constructed_area",
    "plot_area",
    "area_unit",
    "year_construction",
    "energy_rating",
    "energy_performance",
    "image_urls",
    "features",
];

/// Commercial and sale-state attributes of one listing of the property.
pub const LISTING_FIELDS: &[&str] = &[
    "reference",
    "title",
    "description",
    "price_string",
    "price_float",
    "price_cents",
    "price_display",
    "currency",
    "listing_type",
    "for_sale",
    "for_rent",
    "for_rent_long_term",
    "for_rent_short_term",
    "sold",
    "reserved",
    "furnished",
    "agent_name",
    "agent_phone",
    "locale",
    "import_url",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitProperty {
    pub asset_data: Map<String, Value>,
    pub listing_data: Map<String, Value>,
    pub unmapped: Map<String, Value>,
}

/// Partition every key of `record` into exactly one bucket.
pub fn split_property_hash(record: &Map<String, Value>) -> SplitProperty {
    let mut split = SplitProperty::default();
    for (key, value) in record {
        let bucket = if ASSET_FIELDS.contains(&key.as_str()) {
            &mut split.asset_data
        } else if LISTING_FIELDS.contains(&key.as_str()) {
            &mut split.listing_data
        } else {
            &mut split.unmapped
        };
        bucket.insert(key.clone(), value.clone());
    }
    split
}
