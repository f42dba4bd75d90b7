//! Price parsing and currency detection
//!
//! Handles both `1,250,000.50` and `1.250.000,50`: whichever separator
//! appears last is the decimal point. A string with a single kind of
//! separator is read as whole units with thousands grouping.

use serde::{Deserialize, Serialize};

const SYMBOLS: &[(&str, &str)] = &[("$", "USD"), ("£", "GBP"), ("€", "EUR"), ("₹", "INR")];
const ISO_CODES: &[&str] = &["USD", "EUR", "GBP", "INR"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPrice {
    pub price_cents: i64,
    pub currency: String,
    pub display_string: String,
}

/// Currency named by a symbol or ISO code in `raw`.
pub fn detect_currency(raw: &str) -> Option<&'static str> {
    if let Some((_, code)) = SYMBOLS.iter().find(|(symbol, _)| raw.contains(symbol)) {
        return Some(code);
    }
    let upper = raw.to_ascii_uppercase();
    ISO_CODES.iter().copied().find(|code| {
        upper.match_indices(code).any(|(i, _)| {
            let before = upper[..i].chars().next_back();
            let after = upper[i + code.len()..].chars().next();
            let letter = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphabetic());
            !letter(before) && !letter(after)
        })
    })
}

/// Display symbol for a currency code; the code itself when unknown.
pub fn currency_symbol(code: &str) -> &str {
    SYMBOLS
        .iter()
        .find(|(_, c)| c.eq_ignore_ascii_case(code))
        .map(|(symbol, _)| *symbol)
        .unwrap_or(code)
}

/// Amount in minor units. Unparsable or empty input is `0`.
pub fn parse_price_to_cents(raw: &str) -> i64 {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let decimal_at = match (kept.rfind(','), kept.rfind('.')) {
        (Some(comma), Some(dot)) => Some(comma.max(dot)),
        _ => None,
    };

    let (whole, fraction) = match decimal_at {
        Some(i) => (&kept[..i], &kept[i + 1..]),
        None => (kept.as_str(), ""),
    };

    let whole_digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    let fraction_digits: Vec<u32> = fraction.chars().filter_map(|c| c.to_digit(10)).collect();
    if whole_digits.is_empty() && fraction_digits.is_empty() {
        return 0;
    }

    let units = if whole_digits.is_empty() {
        0
    } else {
        match whole_digits.parse::<i64>() {
            Ok(units) => units,
            Err(_) => return 0,
        }
    };

    let tenths = fraction_digits.first().copied().unwrap_or(0);
    let hundredths = fraction_digits.get(1).copied().unwrap_or(0);
    let round_up = fraction_digits.get(2).is_some_and(|d| *d >= 5);
    let cents = i64::from(tenths * 10 + hundredths) + i64::from(round_up);

    units
        .checked_mul(100)
        .and_then(|c| c.checked_add(cents))
        .unwrap_or(0)
}

/// Normalize a price. A non-zero `price_float` from an engine-level numeric
/// field takes precedence over re-parsing the string.
pub fn normalize_price(
    price_string: &str,
    price_float: Option<f64>,
    fallback_currency: Option<&str>,
) -> NormalizedPrice {
    let currency = detect_currency(price_string)
        .map(str::to_string)
        .or_else(|| {
            fallback_currency
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_ascii_uppercase)
        })
        .unwrap_or_else(|| "USD".to_string());

    let price_cents = match price_float {
        Some(f) if f != 0.0 && f.is_finite() => (f * 100.0).round() as i64,
        _ => parse_price_to_cents(price_string),
    };

    let trimmed = price_string.trim();
    let display_string = if trimmed.is_empty() {
        format_display(price_cents, &currency)
    } else {
        trimmed.to_string()
    };

    NormalizedPrice {
        price_cents,
        currency,
        display_string,
    }
}

fn format_display(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let digits = (cents / 100).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let fraction = cents % 100;
    let symbol = currency_symbol(currency);
    if fraction == 0 {
        format!("{sign}{symbol}{grouped}")
    } else {
        format!("{sign}{symbol}{grouped}.{fraction:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_and_eu_formats() {
        assert_eq!(parse_price_to_cents("$1,250,000.50"), 125000050);
        assert_eq!(parse_price_to_cents("€1.250.000,50"), 125000050);
        assert_eq!(parse_price_to_cents(""), 0);
        assert_eq!(parse_price_to_cents("Price on request"), 0);
    }

    #[test]
    fn test_single_separator_is_thousands() {
        assert_eq!(parse_price_to_cents("1.250.000 €"), 125000000);
        assert_eq!(parse_price_to_cents("£950,000"), 95000000);
        assert_eq!(parse_price_to_cents("1200"), 120000);
    }

    #[test]
    fn test_fraction_rounding_and_overflow() {
        assert_eq!(parse_price_to_cents("1,234.567"), 123457);
        assert_eq!(parse_price_to_cents("1.000,5"), 100050);
        assert_eq!(parse_price_to_cents("99999999999999999999999"), 0);
    }

    #[test]
    fn test_currency_detection() {
        assert_eq!(detect_currency("£1,250 pcm"), Some("GBP"));
        assert_eq!(detect_currency("₹ 45,00,000"), Some("INR"));
        assert_eq!(detect_currency("250.000 EUR"), Some("EUR"));
        assert_eq!(detect_currency("EUROPE 250"), None);
        assert_eq!(detect_currency("250000"), None);
    }

    #[test]
    fn test_normalize_price() {
        let price = normalize_price("€ 315.000", None, Some("GBP"));
        assert_eq!(price.currency, "EUR");
        assert_eq!(price.price_cents, 31500000);
        assert_eq!(price.display_string, "€ 315.000");

        let from_float = normalize_price("315k", Some(315000.0), Some("eur"));
        assert_eq!(from_float.price_cents, 31500000);
        assert_eq!(from_float.currency, "EUR");

        let synthesized = normalize_price("", Some(1234567.5), None);
        assert_eq!(synthesized.currency, "USD");
        assert_eq!(synthesized.display_string, "$1,234,567.50");
    }
}
