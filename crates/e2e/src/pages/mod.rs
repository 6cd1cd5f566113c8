//! Page objects for the storefront under test

mod listing;
mod product;

pub use listing::ListingPage;
pub use product::ProductPage;

/// Related-item entries: list rows carrying an "Add to cart" link, or rows of a
/// list inside a "Similar"/"Related" section
pub const RELATED_ITEMS_CSS: &str = r#"ul[role="list"] li:has(> a:has-text("Add to cart")), section:has(> h2:text-matches("Similar|Related", "i")) ul li"#;

/// Price inside a related-item entry
pub const ITEM_PRICE_CSS: &str = r#"[itemprop="price"], .s-item__price"#;

/// Price of the product the page is about
pub const MAIN_PRICE_CSS: &str = r#"[itemprop="price"], #prcIsum"#;

/// Heading names the related-items section is published under
pub const SECTION_HEADING_PATTERN: &str = "similar sponsored items|related items|people who viewed";

pub const SEARCH_BOX_LABEL: &str = "Search for anything";

pub const SPONSORED_LABEL: &str = "Sponsored";

pub const SOLD_OUT_LABEL: &str = "Sold Out";
