//! Home and search-results page

use tracing::{debug, info};

use relcheck_common::RulesConfig;

use crate::driver::{BrowserDriver, LoadState, TolerateAbsence, WaitState};
use crate::error::E2eResult;
use crate::locator::{Locator, TextMatch};
use crate::pages::{SEARCH_BOX_LABEL, SPONSORED_LABEL};

pub struct ListingPage<'a> {
    driver: &'a dyn BrowserDriver,
    rules: &'a RulesConfig,
    search_box: Locator,
    search_button: Locator,
    results_heading: Locator,
}

impl<'a> ListingPage<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, rules: &'a RulesConfig) -> Self {
        Self {
            driver,
            rules,
            search_box: Locator::label(TextMatch::exact(SEARCH_BOX_LABEL)),
            search_button: Locator::role("button", Some(TextMatch::substring("Search"))),
            results_heading: Locator::role("heading", Some(TextMatch::pattern_i("results"))).first(),
        }
    }

    /// First result link that is about the category (or offers "Add to cart")
    /// and is not a sponsored placement
    pub fn first_organic_result(&self) -> Locator {
        let name = format!("{}|add to cart", regex::escape(&self.rules.category().keyword()));
        Locator::role("link", Some(TextMatch::pattern_i(&name)))
            .has_not(Locator::text(TextMatch::substring(SPONSORED_LABEL)))
            .first()
    }

    pub async fn open(&self) -> E2eResult<()> {
        self.driver.goto("/").await?;
        self.driver
            .wait_for_load(LoadState::DomContentLoaded, self.rules.results_timeout())
            .await?;
        Ok(())
    }

    pub async fn search(&self, query: &str) -> E2eResult<()> {
        info!("Searching for '{}'", query);
        self.driver.fill(&self.search_box, query).await?;
        self.driver.click(&self.search_button).await?;
        self.driver
            .wait_for_load(LoadState::Load, self.rules.results_timeout())
            .await?;

        self.driver
            .wait_for(&self.results_heading, WaitState::Visible, self.rules.results_timeout())
            .await
            .or_absent()?;
        Ok(())
    }

    pub async fn open_first_organic_result(&self) -> E2eResult<()> {
        let result = self.first_organic_result();
        debug!("Opening {}", result);
        self.driver.click(&result).await?;
        self.driver
            .wait_for_load(LoadState::Load, self.rules.results_timeout())
            .await
            .or_absent()?;
        Ok(())
    }

    /// Abort every request from here on, as if the connection dropped
    pub async fn simulate_offline(&self) -> E2eResult<()> {
        info!("Simulating network failure: aborting all requests");
        self.driver.abort_all_requests().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SessionOptions;
    use crate::fake::{FakeSession, FakeSite};
    use relcheck_common::SuiteConfig;
    use std::sync::Arc;

    fn fixture() -> (FakeSession, SuiteConfig) {
        let mut config = SuiteConfig::default();
        config.target.base_url = "https://shop.test".to_string();
        let site = FakeSite::storefront(&config.target.base_url);
        (FakeSession::new(Arc::new(site), SessionOptions::from_config(&config)), config)
    }

    #[tokio::test]
    async fn search_then_open_lands_on_the_organic_product() {
        let (driver, config) = fixture();
        let listing = ListingPage::new(&driver, &config.rules);

        listing.open().await.unwrap();
        listing.search("wallet").await.unwrap();
        listing.open_first_organic_result().await.unwrap();

        assert_eq!(driver.current_url().await.unwrap(), "https://shop.test/itm/1001");
    }

    #[tokio::test]
    async fn unknown_queries_leave_search_tolerant() {
        let (driver, config) = fixture();
        let listing = ListingPage::new(&driver, &config.rules);

        listing.open().await.unwrap();
        // no results heading on an unregistered query; the wait is swallowed
        listing.search("garden hose").await.unwrap();
        assert!(listing.open_first_organic_result().await.is_err());
    }

    #[tokio::test]
    async fn offline_breaks_the_next_navigation() {
        let (driver, config) = fixture();
        let listing = ListingPage::new(&driver, &config.rules);

        listing.simulate_offline().await.unwrap();
        assert!(driver.is_offline());
        assert!(listing.open().await.is_err());
    }

    #[test]
    fn organic_locator_escapes_the_category() {
        let (driver, mut config) = fixture();
        config.rules.category = "c++ wallet".to_string();
        let listing = ListingPage::new(&driver, &config.rules);
        assert!(listing
            .first_organic_result()
            .to_string()
            .starts_with(r"role=link[name=/c\+\+ wallet|add to cart/i]"));
    }
}
