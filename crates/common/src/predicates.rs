//! Business-rule predicates for related items
//!
//! Everything in here is pure and deterministic. Page objects feed live page
//! text through these functions; scenarios assert on the results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default relative tolerance of the price band around the main item.
pub const DEFAULT_PRICE_TOLERANCE: f64 = 0.25;

/// Default category keyword related items are matched against.
pub const DEFAULT_CATEGORY: &str = "wallet";

/// A non-negative amount parsed from a display string.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(f64);

impl Money {
    pub const ZERO: Money = Money(0.0);

    /// Wrap an amount. Negative and non-finite amounts become zero.
    pub fn new(amount: f64) -> Self {
        if amount.is_finite() && amount > 0.0 {
            Money(amount)
        } else {
            Money::ZERO
        }
    }

    pub fn amount(self) -> f64 {
        self.0
    }

    /// Parse a display price, returning `None` when no number can be read.
    ///
    /// Every character other than an ASCII digit or `.` is dropped first, so
    /// currency symbols, thousands separators and whitespace all disappear:
    /// `"£1,234"` reads as `1234`. The longest leading decimal number of what
    /// remains is used, so `"12.34.56"` reads as `12.34`.
    pub fn try_parse(text: &str) -> Option<Money> {
        let cleaned: String = text
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        leading_decimal(&cleaned).map(Money::new)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<f64> for Money {
    fn from(amount: f64) -> Self {
        Money::new(amount)
    }
}

fn leading_decimal(cleaned: &str) -> Option<f64> {
    let bytes = cleaned.as_bytes();
    let int_len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    let mut end = int_len;

    if bytes.get(end) == Some(&b'.') {
        let frac_len = bytes[end + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if int_len > 0 || frac_len > 0 {
            end += 1 + frac_len;
        }
    }

    if end == 0 {
        return None;
    }
    cleaned[..end].parse::<f64>().ok()
}

/// Parse a display price. Unparsable input yields zero, never an error.
///
/// An amount too large for `f64` overflows to infinity and is therefore
/// also read as zero, keeping every `Money` finite.
pub fn parse_money(text: &str) -> Money {
    Money::try_parse(text).unwrap_or(Money::ZERO)
}

/// A category keyword, stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Category(String);

impl Category {
    pub fn new(keyword: &str) -> Self {
        Category(keyword.to_lowercase())
    }

    pub fn keyword(&self) -> &str {
        &self.0
    }

    /// Substring match on the lowercased title. No stemming, no plurals.
    pub fn matches(&self, title: &str) -> bool {
        title.to_lowercase().contains(&self.0)
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::new(DEFAULT_CATEGORY)
    }
}

impl From<String> for Category {
    fn from(keyword: String) -> Self {
        Category::new(&keyword)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `title` belongs to the category named by `category`.
pub fn is_same_category(title: &str, category: &str) -> bool {
    Category::new(category).matches(title)
}

/// Inclusive band `[reference * (1 - t), reference * (1 + t)]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn around(reference: Money, tolerance: f64) -> Self {
        let reference = reference.amount();
        PriceRange {
            min: reference * (1.0 - tolerance),
            max: reference * (1.0 + tolerance),
        }
    }

    pub fn contains(&self, price: Money) -> bool {
        let price = price.amount();
        price >= self.min && price <= self.max
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.2}, {:.2}]", self.min, self.max)
    }
}

/// Whether `price` lies inside the tolerance band around `reference`.
///
/// A zero reference collapses the band to `[0, 0]`.
pub fn is_in_price_range(price: Money, reference: Money, tolerance: f64) -> bool {
    PriceRange::around(reference, tolerance).contains(price)
}

/// One entry of the related-items section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedItem {
    pub title: String,
    pub price: Money,
    pub sponsored: bool,
}

impl RelatedItem {
    pub fn in_category(&self, category: &Category) -> bool {
        category.matches(&self.title)
    }

    pub fn in_price_band(&self, reference: Money, tolerance: f64) -> bool {
        is_in_price_range(self.price, reference, tolerance)
    }

    /// Both relatedness rules at once.
    pub fn is_consistent_with(&self, reference: Money, category: &Category, tolerance: f64) -> bool {
        self.in_category(category) && self.in_price_band(reference, tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("$19.99", 19.99 ; "dollar sign")]
    #[test_case("£1,234", 1234.0 ; "comma is stripped")]
    #[test_case("US $1,299.50", 1299.5 ; "prefix and separator")]
    #[test_case("12.34.56", 12.34 ; "second dot ends the number")]
    #[test_case(".5", 0.5 ; "leading dot")]
    #[test_case("7.", 7.0 ; "trailing dot")]
    #[test_case("-5", 5.0 ; "minus is not a digit")]
    fn parses_display_prices(text: &str, expected: f64) {
        assert_eq!(parse_money(text).amount(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("Free" ; "no digits")]
    #[test_case("." ; "lone dot")]
    #[test_case("..." ; "only dots")]
    fn unparsable_prices_are_zero(text: &str) {
        assert_eq!(parse_money(text), Money::ZERO);
        assert_eq!(Money::try_parse(text), None);
    }

    #[test]
    fn try_parse_distinguishes_zero_from_absent() {
        assert_eq!(Money::try_parse("$0.00"), Some(Money::ZERO));
        assert_eq!(Money::try_parse("n/a"), None);
    }

    #[test]
    fn money_rejects_negative_and_nan() {
        assert_eq!(Money::new(-3.0), Money::ZERO);
        assert_eq!(Money::new(f64::NAN), Money::ZERO);
        assert_eq!(Money::new(f64::INFINITY), Money::ZERO);
        assert_eq!(Money::new(2.5).to_string(), "2.50");
    }

    #[test]
    fn overflowing_amounts_read_as_zero() {
        let huge = "9".repeat(400);
        assert_eq!(parse_money(&huge), Money::ZERO);
        assert_eq!(Money::try_parse(&format!("${}", huge)), Some(Money::ZERO));
    }

    #[test]
    fn category_matches_case_insensitively() {
        assert!(is_same_category("Leather Wallet", "wallet"));
        assert!(is_same_category("leather wallet", "WALLET"));
        assert!(!is_same_category("Leather Purse", "wallet"));
        // substring only, no plural handling
        assert!(is_same_category("Wallets for men", "wallet"));
        assert!(!is_same_category("Wallet", "wallets"));
    }

    #[test]
    fn category_round_trips_through_string() {
        let category: Category = String::from("Wallet").into();
        assert_eq!(category.keyword(), "wallet");
        assert_eq!(String::from(category), "wallet");
    }

    #[test]
    fn price_band_is_inclusive() {
        let reference = Money::new(100.0);
        assert!(is_in_price_range(Money::new(80.0), reference, 0.25));
        assert!(is_in_price_range(Money::new(75.0), reference, 0.25));
        assert!(is_in_price_range(Money::new(125.0), reference, 0.25));
        assert!(!is_in_price_range(Money::new(74.99), reference, 0.25));
        assert!(!is_in_price_range(Money::new(125.01), reference, 0.25));
    }

    #[test]
    fn zero_reference_collapses_band() {
        assert!(is_in_price_range(Money::ZERO, Money::ZERO, DEFAULT_PRICE_TOLERANCE));
        assert!(!is_in_price_range(Money::new(0.01), Money::ZERO, DEFAULT_PRICE_TOLERANCE));
        assert_eq!(PriceRange::around(Money::ZERO, 0.25).to_string(), "[0.00, 0.00]");
    }

    #[test]
    fn related_item_consistency() {
        let category = Category::default();
        let item = RelatedItem {
            title: "slim leather wallet".to_string(),
            price: Money::new(22.0),
            sponsored: true,
        };
        assert!(item.is_consistent_with(Money::new(20.0), &category, DEFAULT_PRICE_TOLERANCE));
        assert!(!item.is_consistent_with(Money::new(10.0), &category, DEFAULT_PRICE_TOLERANCE));
        assert!(!item.is_consistent_with(Money::new(20.0), &Category::new("belt"), DEFAULT_PRICE_TOLERANCE));
    }
}
