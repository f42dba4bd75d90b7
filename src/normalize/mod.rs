//! Value normalizers applied after field resolution

mod image_url;
mod listing_type;
mod price;
mod property_type;

pub use image_url::*;
pub use listing_type::*;
pub use price::*;
pub use property_type::*;
