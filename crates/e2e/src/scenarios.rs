//! The related best-sellers scenario catalog
//!
//! Each scenario starts from the storefront home page with cookies cleared,
//! searches, opens the first organic result and checks one rule about the
//! related-items section.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use relcheck_common::{is_in_price_range, is_same_category, Browser, SuiteConfig};

use crate::driver::{BrowserDriver, Geolocation, SessionOptions, Viewport, WaitState};
use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, TextMatch};
use crate::pages::{ListingPage, ProductPage};

/// Viewport used for the mobile layout check
pub const MOBILE_VIEWPORT: Viewport = Viewport {
    width: 390,
    height: 844,
};

/// Text that counts as a visible network failure
pub const OFFLINE_INDICATOR_PATTERN: &str = "error|offline|failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ScenarioId {
    Tc01,
    Tc02,
    Tc03,
    Tc04,
    Tc05,
    Tc06,
    Tc07,
    Tc08,
    Tc09,
    Tc10,
    Tc11,
    Tc12,
    Tc13,
    Tc14,
    Tc15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    Positive,
    Edge,
    Negative,
    Compatibility,
    Performance,
    Usability,
}

/// How the browser session for a scenario differs from the configured one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionProfile {
    #[default]
    Default,
    Mobile,
    Firefox,
}

impl SessionProfile {
    pub fn session_options(self, config: &SuiteConfig) -> SessionOptions {
        let mut options = SessionOptions::from_config(config);
        match self {
            SessionProfile::Default => {}
            SessionProfile::Mobile => {
                options.viewport = MOBILE_VIEWPORT;
                options.is_mobile = true;
            }
            SessionProfile::Firefox => options.browser = Browser::Firefox,
        }
        options
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioMeta {
    pub id: ScenarioId,
    pub code: &'static str,
    pub title: &'static str,
    pub priority: Priority,
    pub kind: ScenarioKind,
    pub query: &'static str,
    pub tags: &'static [&'static str],
    pub profile: SessionProfile,
}

impl ScenarioMeta {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

impl ScenarioId {
    pub const ALL: [ScenarioId; 15] = [
        ScenarioId::Tc01,
        ScenarioId::Tc02,
        ScenarioId::Tc03,
        ScenarioId::Tc04,
        ScenarioId::Tc05,
        ScenarioId::Tc06,
        ScenarioId::Tc07,
        ScenarioId::Tc08,
        ScenarioId::Tc09,
        ScenarioId::Tc10,
        ScenarioId::Tc11,
        ScenarioId::Tc12,
        ScenarioId::Tc13,
        ScenarioId::Tc14,
        ScenarioId::Tc15,
    ];

    pub fn code(self) -> &'static str {
        self.meta().code
    }

    pub fn meta(self) -> ScenarioMeta {
        use Priority::*;
        use ScenarioKind::*;

        let (code, title, priority, kind, query, tags, profile): (
            _,
            _,
            _,
            _,
            _,
            &'static [&'static str],
            _,
        ) = match self {
            ScenarioId::Tc01 => (
                "TC-01",
                "Up to the maximum number of related best sellers show",
                High,
                Positive,
                "wallet",
                &["smoke", "category", "price"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc02 => (
                "TC-02",
                "Fewer items shown without errors",
                Medium,
                Positive,
                "rare vintage wallet",
                &["count"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc03 => (
                "TC-03",
                "Section hidden when nothing matches",
                Medium,
                Edge,
                "extremely rare unobtainium wallet",
                &["count"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc04 => (
                "TC-04",
                "Clicking a related item navigates to its page",
                High,
                Positive,
                "wallet",
                &["smoke", "navigation"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc05 => (
                "TC-05",
                "Mobile layout keeps items visible while scrolling",
                Medium,
                Compatibility,
                "wallet",
                &["mobile", "compatibility"],
                SessionProfile::Mobile,
            ),
            ScenarioId::Tc06 => (
                "TC-06",
                "Section loads within the load budget",
                Medium,
                Performance,
                "wallet",
                &["performance"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc07 => (
                "TC-07",
                "Images have alt text and items are keyboard reachable",
                Medium,
                Usability,
                "wallet",
                &["a11y"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc08 => (
                "TC-08",
                "Auction listing falls back to category matching",
                High,
                Negative,
                "wallet auction",
                &["category", "auction"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc09 => (
                "TC-09",
                "Out-of-stock listing shows items of the same category",
                Medium,
                Edge,
                "sold out wallet",
                &["category", "auction"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc10 => (
                "TC-10",
                "Network failure shows an error",
                High,
                Negative,
                "wallet",
                &["smoke", "network"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc11 => (
                "TC-11",
                "Only items of the right category are shown",
                High,
                Negative,
                "wallet",
                &["smoke", "category"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc12 => (
                "TC-12",
                "Items stay in range for a high-price listing",
                Medium,
                Edge,
                "luxury wallet $500",
                &["price"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc13 => (
                "TC-13",
                "Sponsored items are labelled",
                Medium,
                Positive,
                "wallet",
                &["sponsored"],
                SessionProfile::Default,
            ),
            ScenarioId::Tc14 => (
                "TC-14",
                "Same section on Firefox",
                Medium,
                Compatibility,
                "wallet",
                &["compatibility", "firefox"],
                SessionProfile::Firefox,
            ),
            ScenarioId::Tc15 => (
                "TC-15",
                "Prices in GBP for a UK shopper",
                Medium,
                Positive,
                "wallet",
                &["locale"],
                SessionProfile::Default,
            ),
        };

        ScenarioMeta {
            id: self,
            code,
            title,
            priority,
            kind,
            query,
            tags,
            profile,
        }
    }

    pub async fn run(self, ctx: &ScenarioContext<'_>) -> E2eResult<()> {
        let query = self.meta().query;
        match self {
            ScenarioId::Tc01 => up_to_max_related_items(ctx, query).await,
            ScenarioId::Tc02 => fewer_items_without_errors(ctx, query).await,
            ScenarioId::Tc03 => hidden_without_matches(ctx, query).await,
            ScenarioId::Tc04 => click_navigates(ctx, query).await,
            ScenarioId::Tc05 => mobile_scroll_keeps_items(ctx, query).await,
            ScenarioId::Tc06 => loads_within_budget(ctx, query).await,
            ScenarioId::Tc07 => accessible_items(ctx, query).await,
            ScenarioId::Tc08 | ScenarioId::Tc09 => category_fallback(ctx, query).await,
            ScenarioId::Tc10 => offline_shows_error(ctx, query).await,
            ScenarioId::Tc11 => only_matching_category(ctx, query).await,
            ScenarioId::Tc12 => high_price_in_range(ctx, query).await,
            ScenarioId::Tc13 => sponsored_labelled(ctx, query).await,
            ScenarioId::Tc14 => same_on_firefox(ctx, query).await,
            ScenarioId::Tc15 => gbp_for_uk(ctx, query).await,
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ScenarioId {
    type Err = E2eError;

    /// Accepts `TC-07`, `tc07` or `7`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "");
        let digits = normalized.strip_prefix("TC").unwrap_or(&normalized);
        digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| ScenarioId::ALL.get(i).copied())
            .ok_or_else(|| E2eError::ScenarioNotFound(s.to_string()))
    }
}

/// The catalog, in id order
pub fn catalog() -> Vec<ScenarioMeta> {
    ScenarioId::ALL.iter().map(|id| id.meta()).collect()
}

/// One scenario attempt's view of its session
pub struct ScenarioContext<'a> {
    pub id: ScenarioId,
    pub driver: &'a dyn BrowserDriver,
    pub config: &'a SuiteConfig,
}

impl<'a> ScenarioContext<'a> {
    pub fn new(id: ScenarioId, driver: &'a dyn BrowserDriver, config: &'a SuiteConfig) -> Self {
        Self { id, driver, config }
    }

    pub fn listing(&self) -> ListingPage<'a> {
        ListingPage::new(self.driver, &self.config.rules)
    }

    pub fn product(&self) -> ProductPage<'a> {
        ProductPage::new(self.driver, &self.config.rules)
    }

    /// Start from the home page with no cookies
    pub async fn prepare(&self) -> E2eResult<()> {
        self.driver.goto(&self.config.target.base_url).await?;
        self.driver.clear_cookies().await?;
        Ok(())
    }

    /// Search for `query` and land on the first organic result
    pub async fn open_product(&self, query: &str) -> E2eResult<ProductPage<'a>> {
        let listing = self.listing();
        listing.open().await?;
        listing.search(query).await?;
        listing.open_first_organic_result().await?;
        Ok(self.product())
    }

    pub fn ensure(&self, holds: bool, condition: impl FnOnce() -> String) -> E2eResult<()> {
        if holds {
            Ok(())
        } else {
            Err(E2eError::AssertionFailed {
                scenario: self.id.code().to_string(),
                condition: condition(),
            })
        }
    }

    fn ensure_titles_in_category(&self, titles: &[String]) -> E2eResult<()> {
        let category = &self.config.rules.category;
        for (i, title) in titles.iter().enumerate() {
            self.ensure(is_same_category(title, category), || {
                format!("related item {} '{}' is not a {}", i, title, category)
            })?;
        }
        Ok(())
    }
}

async fn up_to_max_related_items(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    let rules = &ctx.config.rules;

    let count = product.item_count().await?;
    ctx.ensure(count > 0 && count <= rules.max_related_items, || {
        format!("expected 1..={} related items, found {}", rules.max_related_items, count)
    })?;

    let main_price = product.main_price().await?;
    let category = rules.category();
    for (i, item) in product.related_items().await?.iter().enumerate() {
        ctx.ensure(item.in_category(&category), || {
            format!("related item {} '{}' is not a {}", i, item.title, category)
        })?;
        ctx.ensure(item.in_price_band(main_price, rules.price_tolerance), || {
            format!(
                "related item {} costs {}, outside ±{}% of {}",
                i,
                item.price,
                rules.price_tolerance * 100.0,
                main_price
            )
        })?;
    }
    Ok(())
}

async fn fewer_items_without_errors(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    let max = ctx.config.rules.max_related_items;
    let count = product.item_count().await?;
    ctx.ensure(count < max, || format!("expected fewer than {} items, found {}", max, count))?;
    let visible = product.is_section_visible().await?;
    ctx.ensure(visible, || "related section is not visible".to_string())
}

async fn hidden_without_matches(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    let visible = product.is_section_visible().await?;
    ctx.ensure(!visible, || "related section shown although nothing matches".to_string())
}

async fn click_navigates(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    let before = ctx.driver.current_url().await?;
    product.open_item(0).await?;
    let after = ctx.driver.current_url().await?;
    debug!("{} -> {}", before, after);
    ctx.ensure(after != before, || format!("still on {} after opening item 0", before))
}

async fn mobile_scroll_keeps_items(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    let visible = product.is_section_visible().await?;
    ctx.ensure(visible, || "related section is not visible".to_string())?;
    product.scroll_by(500).await?;
    let first_visible = product.is_first_item_visible().await?;
    ctx.ensure(first_visible, || "first related item not visible after scrolling".to_string())
}

async fn loads_within_budget(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    let budget = ctx.config.rules.load_budget();
    let loaded = product.wait_until_loaded(budget).await?;
    ctx.ensure(loaded, || format!("related section not loaded within {} ms", budget.as_millis()))
}

async fn accessible_items(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    product.check_all_images_have_alt_text().await?;
    ctx.driver.press_key("Tab").await?;
    let focused = product.is_first_item_focused().await?;
    ctx.ensure(focused, || "first related item not focused after Tab".to_string())
}

async fn category_fallback(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    if product.is_out_of_stock_or_auction().await? {
        info!("{}: listing is an auction or out of stock, checking category only", ctx.id);
        let titles = product.item_titles().await?;
        ctx.ensure_titles_in_category(&titles)?;
    } else {
        info!("{}: listing has a price and is in stock, nothing to check", ctx.id);
    }
    Ok(())
}

async fn offline_shows_error(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let listing = ctx.listing();
    listing.simulate_offline().await?;

    if let Err(e) = listing.open().await {
        warn!("{}: home page failed while offline: {}", ctx.id, e);
    }
    if let Err(e) = listing.search(query).await {
        warn!("{}: search failed while offline: {}", ctx.id, e);
    }
    if let Err(e) = listing.open_first_organic_result().await {
        warn!("{}: opening a result failed while offline: {}", ctx.id, e);
    }

    let indicator = Locator::text(TextMatch::pattern_i(OFFLINE_INDICATOR_PATTERN)).first();
    let timeout = ctx.config.rules.offline_error_timeout();
    match ctx.driver.wait_for(&indicator, WaitState::Visible, timeout).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_timeout() => ctx.ensure(false, || {
            format!("no error indicator visible within {} ms", timeout.as_millis())
        }),
        Err(e) => Err(e.into()),
    }
}

async fn only_matching_category(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    let titles = product.item_titles().await?;
    ctx.ensure_titles_in_category(&titles)
}

async fn high_price_in_range(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    let rules = &ctx.config.rules;

    let main_price = product.main_price().await?;
    ctx.ensure(main_price.amount() > rules.high_price_floor, || {
        format!("main price {} is not above {}", main_price, rules.high_price_floor)
    })?;

    for (i, price) in product.item_prices().await?.into_iter().enumerate() {
        ctx.ensure(is_in_price_range(price, main_price, rules.price_tolerance), || {
            format!("related item {} costs {}, outside the band around {}", i, price, main_price)
        })?;
    }
    Ok(())
}

async fn sponsored_labelled(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    if product.item_count().await? > 0 {
        let sponsored = product.is_item_sponsored(0).await?;
        ctx.ensure(sponsored, || "related item 0 is not labelled sponsored".to_string())?;
    }
    Ok(())
}

async fn same_on_firefox(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    let product = ctx.open_product(query).await?;
    let visible = product.is_section_visible().await?;
    ctx.ensure(visible, || "related section is not visible".to_string())?;
    let browser = ctx.driver.browser();
    ctx.ensure(browser == Browser::Firefox, || format!("running on {}, not firefox", browser))
}

async fn gbp_for_uk(ctx: &ScenarioContext<'_>, query: &str) -> E2eResult<()> {
    ctx.driver.set_geolocation(Geolocation::LONDON).await?;
    let mut headers = BTreeMap::new();
    headers.insert("Accept-Language".to_string(), "en-GB".to_string());
    ctx.driver.set_extra_headers(&headers).await?;

    let product = ctx.open_product(query).await?;
    let texts = product.price_texts().await?;
    debug!("{}: price texts {:?}", ctx.id, texts);
    ctx.ensure(texts.iter().any(|t| t.contains('£') || t.contains("GBP")), || {
        format!("no price shown in GBP among {:?}", texts)
    })
}
