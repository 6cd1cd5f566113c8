//! Product detail page and its related-items section
//!
//! Reads are best-effort: content that does not show up in time reads as
//! `false`, `0` or empty. Only `check_all_images_have_alt_text` fails on its own.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use relcheck_common::{parse_money, Money, RelatedItem, RulesConfig};

use crate::driver::{BrowserDriver, LoadState, TolerateAbsence, WaitState};
use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, TextMatch};
use crate::pages::{
    ITEM_PRICE_CSS, MAIN_PRICE_CSS, RELATED_ITEMS_CSS, SECTION_HEADING_PATTERN, SOLD_OUT_LABEL,
    SPONSORED_LABEL,
};

pub struct ProductPage<'a> {
    driver: &'a dyn BrowserDriver,
    rules: &'a RulesConfig,
    section_heading: Locator,
    items: Locator,
    main_price: Locator,
    sold_out: Locator,
}

impl<'a> ProductPage<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, rules: &'a RulesConfig) -> Self {
        Self {
            driver,
            rules,
            section_heading: Locator::role("heading", Some(TextMatch::pattern_i(SECTION_HEADING_PATTERN)))
                .first(),
            items: Locator::css(RELATED_ITEMS_CSS),
            main_price: Locator::css(MAIN_PRICE_CSS).first(),
            sold_out: Locator::text(TextMatch::exact(SOLD_OUT_LABEL)).first(),
        }
    }

    fn item_link(&self, index: usize) -> Locator {
        self.items.nth(index).within_role("link", None).first()
    }

    fn item_price(&self, index: usize) -> Locator {
        self.items.nth(index).within_css(ITEM_PRICE_CSS).first()
    }

    /// Bounded wait for the section heading
    pub async fn is_section_visible(&self) -> E2eResult<bool> {
        match self
            .driver
            .wait_for(&self.section_heading, WaitState::Visible, self.rules.section_timeout())
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if e.is_timeout() => {
                debug!("Related section not visible: {}", e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Zero whenever the section is not visible
    pub async fn item_count(&self) -> E2eResult<usize> {
        if !self.is_section_visible().await? {
            return Ok(0);
        }
        Ok(self.driver.count(&self.items).await?)
    }

    /// Lowercased, trimmed titles
    pub async fn item_titles(&self) -> E2eResult<Vec<String>> {
        let count = self.item_count().await?;
        let mut titles = Vec::with_capacity(count);
        for i in 0..count {
            let title = self.driver.inner_text(&self.item_link(i)).await.or_absent()?;
            titles.push(title.trim().to_lowercase());
        }
        Ok(titles)
    }

    pub async fn item_prices(&self) -> E2eResult<Vec<Money>> {
        let count = self.item_count().await?;
        let mut prices = Vec::with_capacity(count);
        for i in 0..count {
            let text = self.driver.inner_text(&self.item_price(i)).await.or_absent()?;
            prices.push(parse_money(&text));
        }
        Ok(prices)
    }

    /// Raw price strings, currency symbols included
    pub async fn price_texts(&self) -> E2eResult<Vec<String>> {
        Ok(self
            .driver
            .all_inner_texts(&self.items.within_css(ITEM_PRICE_CSS))
            .await
            .or_absent()?)
    }

    /// Titles, prices and sponsorship of every entry
    pub async fn related_items(&self) -> E2eResult<Vec<RelatedItem>> {
        let titles = self.item_titles().await?;
        let prices = self.item_prices().await?;
        let mut items = Vec::with_capacity(titles.len());
        for (i, (title, price)) in titles.into_iter().zip(prices).enumerate() {
            let sponsored = self.is_item_sponsored(i).await?;
            items.push(RelatedItem { title, price, sponsored });
        }
        Ok(items)
    }

    pub async fn main_price(&self) -> E2eResult<Money> {
        let text = self.driver.inner_text(&self.main_price).await.or_absent()?;
        Ok(parse_money(&text))
    }

    /// Open the entry at `index` and wait for the network to settle
    pub async fn open_item(&self, index: usize) -> E2eResult<()> {
        self.driver.click(&self.item_link(index)).await?;
        if let Err(e) = self
            .driver
            .wait_for_load(LoadState::NetworkIdle, self.rules.section_timeout())
            .await
        {
            if !e.is_timeout() {
                return Err(e.into());
            }
            warn!("Network did not go idle after opening item {}: {}", index, e);
        }
        Ok(())
    }

    pub async fn is_item_sponsored(&self, index: usize) -> E2eResult<bool> {
        let label = self
            .items
            .nth(index)
            .within_text(TextMatch::substring(SPONSORED_LABEL))
            .first();
        Ok(self.driver.is_visible(&label).await.or_absent()?)
    }

    /// Poll the section heading every `poll_interval` until `timeout`
    pub async fn wait_until_loaded(&self, timeout: Duration) -> E2eResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.driver.is_visible(&self.section_heading).await.or_absent()? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.rules.poll_interval().min(deadline - now)).await;
        }
    }

    /// Every image in the section carries a non-empty alt text
    pub async fn check_all_images_have_alt_text(&self) -> E2eResult<()> {
        let images = self.items.within_css("img");
        let count = self.driver.count(&images).await?;
        for i in 0..count {
            let alt = self.driver.attribute(&images.nth(i), "alt").await?;
            if alt.as_deref().map_or(true, str::is_empty) {
                return Err(E2eError::assertion(format!(
                    "related item image {} has no alt text",
                    i
                )));
            }
        }
        debug!("{} related images carry alt text", count);
        Ok(())
    }

    /// Main price missing, or a "Sold Out" label on the page
    pub async fn is_out_of_stock_or_auction(&self) -> E2eResult<bool> {
        let price_visible = self.driver.is_visible(&self.main_price).await.or_absent()?;
        let sold_out = self.driver.is_visible(&self.sold_out).await.or_absent()?;
        Ok(!price_visible || sold_out)
    }

    pub async fn is_first_item_visible(&self) -> E2eResult<bool> {
        Ok(self.driver.is_visible(&self.items.first()).await.or_absent()?)
    }

    pub async fn is_first_item_focused(&self) -> E2eResult<bool> {
        Ok(self.driver.is_focused(&self.items.first()).await.or_absent()?)
    }

    pub async fn scroll_by(&self, dy: i64) -> E2eResult<()> {
        self.driver.scroll_by(0, dy).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SessionOptions;
    use crate::fake::{FakePage, FakeSession, FakeSite, ItemSpec, ProductSpec};
    use relcheck_common::SuiteConfig;
    use std::sync::Arc;

    const BASE: &str = "https://shop.test";

    async fn single_product(spec: ProductSpec) -> (FakeSession, SuiteConfig) {
        let mut config = SuiteConfig::default();
        config.target.base_url = BASE.to_string();
        let site = FakeSite::new(BASE).page("/p", FakePage::product(&spec));
        let driver = FakeSession::new(Arc::new(site), SessionOptions::from_config(&config));
        driver.goto("/p").await.unwrap();
        (driver, config)
    }

    #[tokio::test]
    async fn reads_titles_prices_and_sponsorship() {
        let (driver, config) = single_product(ProductSpec::new("Wallet", "US $20.00").items([
            ItemSpec::new("  Slim WALLET ", "US $18.50").sponsored(),
            ItemSpec::new("Card wallet", "$1,021.00"),
        ])).await;
        let page = ProductPage::new(&driver, &config.rules);

        assert!(page.is_section_visible().await.unwrap());
        assert_eq!(page.item_count().await.unwrap(), 2);
        assert_eq!(page.item_titles().await.unwrap(), vec!["slim wallet", "card wallet"]);
        assert_eq!(page.item_prices().await.unwrap(), vec![Money::new(18.5), Money::new(1021.0)]);
        assert_eq!(page.main_price().await.unwrap(), Money::new(20.0));
        assert!(page.is_item_sponsored(0).await.unwrap());
        assert!(!page.is_item_sponsored(1).await.unwrap());

        let items = page.related_items().await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[0].sponsored);
        assert_eq!(items[1].price, Money::new(1021.0));
    }

    #[tokio::test]
    async fn hidden_section_reads_as_empty() {
        let (driver, config) = single_product(ProductSpec::new("Wallet", "$20").without_section()).await;
        let page = ProductPage::new(&driver, &config.rules);

        assert!(!page.is_section_visible().await.unwrap());
        assert_eq!(page.item_count().await.unwrap(), 0);
        assert!(page.item_titles().await.unwrap().is_empty());
        assert!(page.item_prices().await.unwrap().is_empty());
        assert!(page.price_texts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_main_price_reads_as_zero_and_auction() {
        let (driver, config) = single_product(ProductSpec::new("Wallet", "").without_price()).await;
        let page = ProductPage::new(&driver, &config.rules);
        assert_eq!(page.main_price().await.unwrap(), Money::ZERO);
        assert!(page.is_out_of_stock_or_auction().await.unwrap());
    }

    #[tokio::test]
    async fn sold_out_label_marks_out_of_stock() {
        let (driver, config) = single_product(ProductSpec::new("Wallet", "$20").sold_out()).await;
        let page = ProductPage::new(&driver, &config.rules);
        assert!(page.is_out_of_stock_or_auction().await.unwrap());

        let (driver, config) = single_product(ProductSpec::new("Wallet", "$20")).await;
        let page = ProductPage::new(&driver, &config.rules);
        assert!(!page.is_out_of_stock_or_auction().await.unwrap());
    }

    #[tokio::test]
    async fn missing_alt_text_fails_with_the_image_index() {
        let (driver, config) = single_product(ProductSpec::new("Wallet", "$20").items([
            ItemSpec::new("a wallet", "$20"),
            ItemSpec::new("b wallet", "$21").without_alt(),
        ])).await;
        let page = ProductPage::new(&driver, &config.rules);
        match page.check_all_images_have_alt_text().await {
            Err(E2eError::AssertionFailed { condition, .. }) => assert!(condition.contains("image 1")),
            other => panic!("expected assertion failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn any_non_empty_alt_text_is_accepted() {
        let (driver, config) = single_product(ProductSpec::new("Wallet", "$20").items([
            ItemSpec::new("a wallet", "$20").alt(" "),
            ItemSpec::new("b wallet", "$21").alt(""),
        ])).await;
        let page = ProductPage::new(&driver, &config.rules);
        match page.check_all_images_have_alt_text().await {
            Err(E2eError::AssertionFailed { condition, .. }) => {
                assert_eq!(condition, "related item image 1 has no alt text")
            }
            other => panic!("expected assertion failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn open_item_follows_the_link() {
        let (driver, config) = single_product(
            ProductSpec::new("Wallet", "$20").items([ItemSpec::new("a wallet", "$20").href("/itm/42")]),
        ).await;
        let page = ProductPage::new(&driver, &config.rules);
        page.open_item(0).await.unwrap();
        assert_eq!(driver.current_url().await.unwrap(), format!("{}/itm/42", BASE));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_loaded_polls_until_the_section_appears() {
        let spec = ProductSpec::new("Wallet", "$20")
            .items([ItemSpec::new("a wallet", "$20")])
            .section_delay(Duration::from_millis(1_200));

        let (driver, config) = single_product(spec.clone()).await;
        let page = ProductPage::new(&driver, &config.rules);
        let started = Instant::now();
        assert!(page.wait_until_loaded(Duration::from_secs(3)).await.unwrap());
        // first poll after the reveal lands on the 500 ms grid
        assert_eq!(started.elapsed(), Duration::from_millis(1_500));

        let (driver, config) = single_product(spec).await;
        let page = ProductPage::new(&driver, &config.rules);
        let started = Instant::now();
        assert!(!page.wait_until_loaded(Duration::from_secs(1)).await.unwrap());
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn focus_and_scroll_helpers() {
        let (driver, config) = single_product(
            ProductSpec::new("Wallet", "$20").items([ItemSpec::new("a wallet", "$20")]),
        ).await;
        let page = ProductPage::new(&driver, &config.rules);
        assert!(!page.is_first_item_focused().await.unwrap());
        driver.press_key("Tab").await.unwrap();
        assert!(page.is_first_item_focused().await.unwrap());

        page.scroll_by(500).await.unwrap();
        assert_eq!(driver.scroll_y(), 500);
        assert!(page.is_first_item_visible().await.unwrap());
    }
}
