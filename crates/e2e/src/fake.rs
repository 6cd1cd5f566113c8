//! In-memory browser for deterministic tests
//!
//! `FakeSite` is a tiny model of the storefront: pages made of `FakeElement`
//! trees, plus a search index mapping queries to result pages. `FakeSession`
//! implements `BrowserDriver` over it, resolving `Locator`s roughly the way
//! Playwright does (strict single-element actions, substring/regex text
//! matching, `has_not` relative to each candidate).
//!
//! Elements that can never appear fail their waits immediately instead of
//! sleeping out the timeout, so tests stay fast without paused time.

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::RegexBuilder;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use relcheck_common::Browser;

use crate::driver::{BrowserDriver, Geolocation, Launcher, LoadState, SessionOptions, WaitState};
use crate::error::{DriverError, DriverResult};
use crate::locator::{Locator, LocatorStep, Selector, TextMatch};
use crate::pages::{
    ITEM_PRICE_CSS, MAIN_PRICE_CSS, RELATED_ITEMS_CSS, SEARCH_BOX_LABEL, SOLD_OUT_LABEL,
    SPONSORED_LABEL,
};

/// What happens when an element is clicked
#[derive(Debug, Clone, PartialEq)]
pub enum ClickAction {
    Navigate(String),
    /// Run a search for the last value typed into any field
    SubmitSearch,
}

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    role: Option<String>,
    text: String,
    label: Option<String>,
    css: Vec<String>,
    attributes: BTreeMap<String, String>,
    hidden: bool,
    reveal_after: Option<Duration>,
    focusable: bool,
    on_click: Option<ClickAction>,
    children: Vec<FakeElement>,
}

impl FakeElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn matching_css(css: &str) -> Self {
        Self::new().css(css)
    }

    /// Make the element answer to `css`
    pub fn css(mut self, css: &str) -> Self {
        self.css.push(css.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Attach the element only once the page has been loaded for `delay`
    pub fn revealed_after(mut self, delay: Duration) -> Self {
        self.reveal_after = Some(delay);
        self
    }

    pub fn focusable(mut self) -> Self {
        self.focusable = true;
        self
    }

    pub fn navigates_to(mut self, path: &str) -> Self {
        self.on_click = Some(ClickAction::Navigate(path.to_string()));
        self
    }

    pub fn submits_search(mut self) -> Self {
        self.on_click = Some(ClickAction::SubmitSearch);
        self
    }

    pub fn child(mut self, child: FakeElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = FakeElement>) -> Self {
        self.children.extend(children);
        self
    }
}

/// One page of the fake site
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    roots: Vec<FakeElement>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, element: FakeElement) -> Self {
        self.roots.push(element);
        self
    }

    /// Header shared by every storefront page
    fn header() -> Vec<FakeElement> {
        vec![
            FakeElement::with_role("textbox", "").label(SEARCH_BOX_LABEL),
            FakeElement::with_role("button", "Search").submits_search(),
        ]
    }

    pub fn home() -> Self {
        let mut page = FakePage::new();
        page.roots.extend(Self::header());
        page.with(FakeElement::with_role("heading", "Today's deals"))
    }

    /// Search results: a sponsored listing first, then the organic hit
    pub fn results(query: &str, product_path: &str) -> Self {
        let mut page = FakePage::new();
        page.roots.extend(Self::header());
        page.with(FakeElement::with_role("heading", &format!("1,000+ results for {}", query)))
            .with(
                FakeElement::with_role("link", &format!("Sponsored {} deal", query))
                    .child(FakeElement::with_text(SPONSORED_LABEL))
                    .navigates_to("/itm/sponsored"),
            )
            .with(FakeElement::with_role("link", &format!("Genuine {} listing", query)).navigates_to(product_path))
    }

    pub fn product(spec: &ProductSpec) -> Self {
        let mut page = FakePage::new();
        page.roots.extend(Self::header());
        page = page.with(FakeElement::with_role("heading", &spec.title));

        if let Some(price) = &spec.main_price {
            page = page.with(FakeElement::matching_css(MAIN_PRICE_CSS).text(price));
        }
        if spec.sold_out {
            page = page.with(FakeElement::with_text(SOLD_OUT_LABEL));
        }

        if let Some(heading) = &spec.section_heading {
            let mut heading_el = FakeElement::with_role("heading", heading);
            if let Some(delay) = spec.section_delay {
                heading_el = heading_el.revealed_after(delay);
            }
            let items = spec.items.iter().map(|item| item.element());
            page = page.with(FakeElement::new().child(heading_el).children(items));
        }
        page
    }

    /// What a browser shows after a failed navigation
    pub fn network_error() -> Self {
        FakePage::new()
            .with(FakeElement::with_role("heading", "This site can't be reached"))
            .with(FakeElement::with_text("net::ERR_FAILED"))
    }
}

/// A product page's main listing and its related-items section
#[derive(Debug, Clone)]
pub struct ProductSpec {
    pub title: String,
    pub main_price: Option<String>,
    pub sold_out: bool,
    pub section_heading: Option<String>,
    pub section_delay: Option<Duration>,
    pub items: Vec<ItemSpec>,
}

impl ProductSpec {
    pub fn new(title: &str, main_price: &str) -> Self {
        Self {
            title: title.to_string(),
            main_price: Some(main_price.to_string()),
            sold_out: false,
            section_heading: Some("Similar sponsored items".to_string()),
            section_delay: None,
            items: Vec::new(),
        }
    }

    pub fn items(mut self, items: impl IntoIterator<Item = ItemSpec>) -> Self {
        self.items.extend(items);
        self
    }

    pub fn without_section(mut self) -> Self {
        self.section_heading = None;
        self.items.clear();
        self
    }

    pub fn without_price(mut self) -> Self {
        self.main_price = None;
        self
    }

    pub fn sold_out(mut self) -> Self {
        self.sold_out = true;
        self
    }

    pub fn section_delay(mut self, delay: Duration) -> Self {
        self.section_delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ItemSpec {
    pub title: String,
    pub price: String,
    pub sponsored: bool,
    pub hidden: bool,
    pub alt: Option<String>,
    pub href: String,
}

impl ItemSpec {
    pub fn new(title: &str, price: &str) -> Self {
        Self {
            title: title.to_string(),
            price: price.to_string(),
            sponsored: false,
            hidden: false,
            alt: Some(title.to_string()),
            href: "/itm/related".to_string(),
        }
    }

    pub fn sponsored(mut self) -> Self {
        self.sponsored = true;
        self
    }

    /// Render the entry with `display: none`
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn alt(mut self, alt: &str) -> Self {
        self.alt = Some(alt.to_string());
        self
    }

    pub fn without_alt(mut self) -> Self {
        self.alt = None;
        self
    }

    pub fn href(mut self, href: &str) -> Self {
        self.href = href.to_string();
        self
    }

    fn element(&self) -> FakeElement {
        let mut image = FakeElement::matching_css("img");
        if let Some(alt) = &self.alt {
            image = image.attr("alt", alt);
        }
        let mut row = FakeElement::matching_css(RELATED_ITEMS_CSS)
            .focusable()
            .child(image)
            .child(FakeElement::with_role("link", &self.title).navigates_to(&self.href))
            .child(FakeElement::matching_css(ITEM_PRICE_CSS).text(&self.price));
        if self.sponsored {
            row = row.child(FakeElement::with_text(SPONSORED_LABEL));
        }
        if self.hidden {
            row = row.hidden();
        }
        row
    }
}

/// The whole fake storefront
#[derive(Debug, Clone)]
pub struct FakeSite {
    base_url: String,
    pages: HashMap<String, FakePage>,
    searches: HashMap<String, String>,
    offline_page: FakePage,
}

impl FakeSite {
    pub fn new(base_url: &str) -> Self {
        let mut site = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            pages: HashMap::new(),
            searches: HashMap::new(),
            offline_page: FakePage::network_error(),
        };
        site.pages.insert("/".to_string(), FakePage::home());
        site
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn page(mut self, path: &str, page: FakePage) -> Self {
        self.pages.insert(path.to_string(), page);
        self
    }

    /// What navigation shows once requests are aborted
    pub fn offline_page(mut self, page: FakePage) -> Self {
        self.offline_page = page;
        self
    }

    /// Register a query whose first organic result is a product page
    pub fn product_for(mut self, query: &str, product_path: &str, spec: &ProductSpec) -> Self {
        let results_path = Self::results_path(query);
        self.pages.insert(results_path.clone(), FakePage::results(query, product_path));
        self.pages.insert(product_path.to_string(), FakePage::product(spec));
        self.searches.insert(query.to_lowercase(), results_path);
        self
    }

    pub fn results_path(query: &str) -> String {
        format!("/sch/i.html?_nkw={}", query.replace(' ', "+"))
    }

    /// A storefront on which every catalog scenario passes with default rules
    pub fn storefront(base_url: &str) -> Self {
        let wallets = |prices: &[&str]| -> Vec<ItemSpec> {
            prices
                .iter()
                .enumerate()
                .map(|(i, price)| {
                    let item = ItemSpec::new(&format!("Leather Wallet Model {}", i + 1), price)
                        .href(&format!("/itm/30{:02}", i));
                    if i == 0 {
                        item.sponsored()
                    } else {
                        item
                    }
                })
                .collect()
        };

        FakeSite::new(base_url)
            .product_for(
                "wallet",
                "/itm/1001",
                &ProductSpec::new("Men's Bifold Leather Wallet", "US $24.99").items(wallets(&[
                    "US $22.00", "US $24.50", "US $19.99", "US $27.00", "US $30.00", "US $25.00",
                ])),
            )
            .product_for(
                "rare vintage wallet",
                "/itm/1002",
                &ProductSpec::new("Vintage Tooled Wallet", "US $80.00")
                    .items(wallets(&["US $70.00", "US $85.00", "US $95.00", "US $62.00"])),
            )
            .product_for(
                "extremely rare unobtainium wallet",
                "/itm/1003",
                &ProductSpec::new("Unobtainium Wallet", "US $999.00").without_section(),
            )
            .product_for(
                "wallet auction",
                "/itm/1004",
                &ProductSpec::new("Auction: Antique Wallet", "")
                    .without_price()
                    .items(wallets(&["US $15.00", "US $45.00"])),
            )
            .product_for(
                "sold out wallet",
                "/itm/1005",
                &ProductSpec::new("Limited Wallet", "US $40.00")
                    .sold_out()
                    .items(wallets(&["US $38.00", "US $120.00", "US $9.00"])),
            )
            .product_for(
                "luxury wallet $500",
                "/itm/1006",
                &ProductSpec::new("Luxury Calfskin Wallet", "US $500.00")
                    .items(wallets(&["US $450.00", "US $520.00", "US $610.00"])),
            )
            .page(
                "/itm/3000",
                FakePage::product(&ProductSpec::new("Leather Wallet Model 1", "US $22.00")),
            )
    }

    fn path_of(&self, url: &str) -> String {
        let path = url.strip_prefix(&self.base_url).unwrap_or(url);
        if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        }
    }

    fn lookup(&self, path: &str) -> FakePage {
        self.pages.get(path).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
struct Node {
    role: Option<String>,
    text: String,
    label: Option<String>,
    css: Vec<String>,
    attributes: BTreeMap<String, String>,
    hidden: bool,
    reveal_after: Option<Duration>,
    focusable: bool,
    on_click: Option<ClickAction>,
    parent: Option<usize>,
    /// One past the last descendant in pre-order
    subtree_end: usize,
}

#[derive(Debug, Clone)]
struct LoadedPage {
    url: String,
    nodes: Vec<Node>,
    loaded_at: Instant,
}

impl LoadedPage {
    fn load(url: String, page: FakePage, gbp: bool) -> Self {
        fn flatten(element: FakeElement, parent: Option<usize>, nodes: &mut Vec<Node>, gbp: bool) {
            let index = nodes.len();
            let text = if gbp { element.text.replace("US $", "£").replace('$', "£") } else { element.text };
            nodes.push(Node {
                role: element.role,
                text,
                label: element.label,
                css: element.css,
                attributes: element.attributes,
                hidden: element.hidden,
                reveal_after: element.reveal_after,
                focusable: element.focusable,
                on_click: element.on_click,
                parent,
                subtree_end: index + 1,
            });
            for child in element.children {
                flatten(child, Some(index), nodes, gbp);
            }
            nodes[index].subtree_end = nodes.len();
        }

        let mut nodes = Vec::new();
        for root in page.roots {
            flatten(root, None, &mut nodes, gbp);
        }
        Self {
            url,
            nodes,
            loaded_at: Instant::now(),
        }
    }

    fn ancestors_and_self(&self, id: usize) -> impl Iterator<Item = &Node> {
        let mut next = Some(id);
        std::iter::from_fn(move || {
            let current = next?;
            next = self.nodes[current].parent;
            Some(&self.nodes[current])
        })
    }

    /// When the node and all its ancestors are in the DOM
    fn attached_at(&self, id: usize) -> Instant {
        self.ancestors_and_self(id)
            .filter_map(|n| n.reveal_after)
            .max()
            .map(|delay| self.loaded_at + delay)
            .unwrap_or(self.loaded_at)
    }

    fn is_attached(&self, id: usize) -> bool {
        self.attached_at(id) <= Instant::now()
    }

    fn is_visible(&self, id: usize) -> bool {
        self.is_attached(id) && self.ancestors_and_self(id).all(|n| !n.hidden)
    }

    fn full_text(&self, id: usize) -> String {
        let node = &self.nodes[id];
        let mut parts = Vec::new();
        if !node.text.is_empty() {
            parts.push(node.text.clone());
        }
        let mut child = id + 1;
        while child < node.subtree_end {
            let text = self.full_text(child);
            if !text.is_empty() {
                parts.push(text);
            }
            child = self.nodes[child].subtree_end;
        }
        parts.join(" ").trim().to_string()
    }

    fn matches(&self, id: usize, selector: &Selector) -> bool {
        let node = &self.nodes[id];
        match selector {
            Selector::Css { css } => node.css.iter().any(|c| c == css),
            Selector::Role { role, name } => {
                node.role.as_deref() == Some(role.as_str())
                    && name.as_ref().map_or(true, |name| {
                        let accessible = node.label.clone().unwrap_or_else(|| self.full_text(id));
                        text_matches(name, &accessible)
                    })
            }
            Selector::Label { text } => node.label.as_deref().is_some_and(|label| text_matches(text, label)),
            Selector::Text { text } => !node.text.is_empty() && text_matches(text, &node.text),
        }
    }

    /// Attached candidates below `scope` (the whole page when `None`), in document order
    fn resolve_in(&self, scope: Option<usize>, locator: &Locator, include_detached: bool) -> Vec<usize> {
        let mut current: Option<Vec<usize>> = scope.map(|id| vec![id]);
        for step in locator.steps() {
            current = Some(match step {
                LocatorStep::Find { selector } => {
                    let ranges: Vec<(usize, usize)> = match &current {
                        None => vec![(0, self.nodes.len())],
                        Some(ids) => ids.iter().map(|&id| (id + 1, self.nodes[id].subtree_end)).collect(),
                    };
                    let found: BTreeSet<usize> = ranges
                        .into_iter()
                        .flat_map(|(start, end)| start..end)
                        .filter(|&id| include_detached || self.is_attached(id))
                        .filter(|&id| self.matches(id, selector))
                        .collect();
                    found.into_iter().collect()
                }
                LocatorStep::Nth { index } => current
                    .unwrap_or_default()
                    .get(*index)
                    .copied()
                    .into_iter()
                    .collect(),
                LocatorStep::HasNot { inner } => current
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|&id| self.resolve_in(Some(id), inner, false).is_empty())
                    .collect(),
            });
        }
        current.unwrap_or_default()
    }

    fn resolve(&self, locator: &Locator) -> Vec<usize> {
        self.resolve_in(None, locator, false)
    }
}

fn text_matches(pattern: &TextMatch, text: &str) -> bool {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match pattern {
        TextMatch::Substring(needle) => normalized.to_lowercase().contains(&needle.trim().to_lowercase()),
        TextMatch::Exact(expected) => normalized == *expected,
        TextMatch::Pattern { source, ignore_case } => RegexBuilder::new(source)
            .case_insensitive(*ignore_case)
            .build()
            .map(|re| re.is_match(&normalized))
            .unwrap_or(false),
    }
}

#[derive(Debug, Default)]
struct SessionState {
    page: Option<LoadedPage>,
    offline: bool,
    cookies_cleared: u32,
    last_typed: Option<String>,
    focused: Option<usize>,
    scroll_y: i64,
    headers: BTreeMap<String, String>,
    geolocation: Option<Geolocation>,
    visits: Vec<String>,
    tracing: bool,
}

/// A `BrowserDriver` over a `FakeSite`
pub struct FakeSession {
    site: Arc<FakeSite>,
    options: SessionOptions,
    state: Mutex<SessionState>,
}

impl FakeSession {
    pub fn new(site: Arc<FakeSite>, options: SessionOptions) -> Self {
        let state = SessionState {
            headers: options.extra_headers.clone(),
            geolocation: options.geolocation,
            ..SessionState::default()
        };
        Self {
            site,
            options,
            state: Mutex::new(state),
        }
    }

    pub fn cookies_cleared(&self) -> u32 {
        self.state.lock().cookies_cleared
    }

    pub fn is_offline(&self) -> bool {
        self.state.lock().offline
    }

    pub fn visits(&self) -> Vec<String> {
        self.state.lock().visits.clone()
    }

    pub fn scroll_y(&self) -> i64 {
        self.state.lock().scroll_y
    }

    pub fn geolocation(&self) -> Option<Geolocation> {
        self.state.lock().geolocation
    }

    fn action_timeout(&self, what: &Locator) -> DriverError {
        DriverError::Timeout {
            what: what.to_string(),
            timeout_ms: self.options.action_timeout_ms,
        }
    }

    fn wants_gbp(&self, state: &SessionState) -> bool {
        let locale_gb = self.options.locale.as_deref().is_some_and(|l| l.eq_ignore_ascii_case("en-GB"));
        let header_gb = state
            .headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("accept-language") && v.to_ascii_lowercase().starts_with("en-gb"));
        locale_gb || header_gb
    }

    fn navigate(&self, state: &mut SessionState, url: &str) -> DriverResult<()> {
        let path = self.site.path_of(url);
        let full_url = format!("{}{}", self.site.base_url(), path);
        state.visits.push(full_url.clone());
        state.focused = None;
        state.scroll_y = 0;

        if state.offline {
            state.page = Some(LoadedPage::load(full_url.clone(), self.site.offline_page.clone(), false));
            return Err(DriverError::Navigation {
                url: full_url,
                reason: "net::ERR_FAILED".to_string(),
            });
        }

        debug!("fake navigation to {}", full_url);
        let gbp = self.wants_gbp(state);
        state.page = Some(LoadedPage::load(full_url, self.site.lookup(&path), gbp));
        Ok(())
    }

    /// The single element a strict action applies to
    fn single(&self, page: &LoadedPage, locator: &Locator) -> DriverResult<usize> {
        match page.resolve(locator).as_slice() {
            [] => Err(self.action_timeout(locator)),
            [id] => Ok(*id),
            many => Err(DriverError::Action(format!(
                "strict mode violation: {} resolved to {} elements",
                locator,
                many.len()
            ))),
        }
    }
}

#[async_trait]
impl BrowserDriver for FakeSession {
    fn browser(&self) -> Browser {
        self.options.browser
    }

    async fn goto(&self, url: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        self.navigate(&mut state, url)
    }

    async fn wait_for_load(&self, _state: LoadState, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let state = self.state.lock();
        Ok(state
            .page
            .as_ref()
            .map(|p| p.url.clone())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        let page = state.page.as_ref().ok_or_else(|| self.action_timeout(locator))?;
        self.single(page, locator)?;
        state.last_typed = Some(value.to_string());
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> DriverResult<()> {
        let mut state = self.state.lock();
        let page = state.page.as_ref().ok_or_else(|| self.action_timeout(locator))?;
        let id = self.single(page, locator)?;
        if !page.is_visible(id) {
            return Err(self.action_timeout(locator));
        }
        let action = page.nodes[id].on_click.clone();
        let focusable = page.nodes[id].focusable;
        if focusable {
            state.focused = Some(id);
        }

        match action {
            Some(ClickAction::Navigate(path)) => self.navigate(&mut state, &path),
            Some(ClickAction::SubmitSearch) => {
                let query = state.last_typed.clone().unwrap_or_default();
                let path = self
                    .site
                    .searches
                    .get(&query.to_lowercase())
                    .cloned()
                    .unwrap_or_else(|| FakeSite::results_path(&query));
                self.navigate(&mut state, &path)
            }
            None => Ok(()),
        }
    }

    async fn press_key(&self, key: &str) -> DriverResult<()> {
        let mut state = self.state.lock();
        if key != "Tab" {
            return Ok(());
        }
        let Some(page) = state.page.as_ref() else {
            return Ok(());
        };
        let start = state.focused.map_or(0, |id| id + 1);
        let next = (start..page.nodes.len()).find(|&id| page.nodes[id].focusable && page.is_visible(id));
        state.focused = next;
        Ok(())
    }

    async fn scroll_by(&self, _dx: i64, dy: i64) -> DriverResult<()> {
        self.state.lock().scroll_y += dy;
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, wait: WaitState, timeout: Duration) -> DriverResult<()> {
        let timed_out = || DriverError::Timeout {
            what: locator.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };

        let reveal_at = {
            let state = self.state.lock();
            let Some(page) = state.page.as_ref() else {
                return match wait {
                    WaitState::Hidden | WaitState::Detached => Ok(()),
                    _ => Err(timed_out()),
                };
            };
            let attached = page.resolve(locator);
            let satisfied = match wait {
                WaitState::Visible => attached.iter().any(|&id| page.is_visible(id)),
                WaitState::Hidden => !attached.iter().any(|&id| page.is_visible(id)),
                WaitState::Attached => !attached.is_empty(),
                WaitState::Detached => attached.is_empty(),
            };
            if satisfied {
                return Ok(());
            }
            if !matches!(wait, WaitState::Visible | WaitState::Attached) {
                return Err(timed_out());
            }
            // Elements not attached yet but scheduled to be
            page.resolve_in(None, locator, true)
                .into_iter()
                .filter(|&id| wait == WaitState::Attached || page.ancestors_and_self(id).all(|n| !n.hidden))
                .map(|id| page.attached_at(id))
                .min()
        };

        match reveal_at {
            Some(at) if at <= Instant::now() + timeout => {
                tokio::time::sleep_until(at).await;
                Ok(())
            }
            _ => Err(timed_out()),
        }
    }

    async fn count(&self, locator: &Locator) -> DriverResult<usize> {
        let state = self.state.lock();
        Ok(state.page.as_ref().map_or(0, |page| page.resolve(locator).len()))
    }

    async fn inner_text(&self, locator: &Locator) -> DriverResult<String> {
        let state = self.state.lock();
        let page = state.page.as_ref().ok_or_else(|| self.action_timeout(locator))?;
        let id = self.single(page, locator)?;
        Ok(page.full_text(id))
    }

    async fn all_inner_texts(&self, locator: &Locator) -> DriverResult<Vec<String>> {
        let state = self.state.lock();
        Ok(state.page.as_ref().map_or_else(Vec::new, |page| {
            page.resolve(locator).into_iter().map(|id| page.full_text(id)).collect()
        }))
    }

    async fn attribute(&self, locator: &Locator, name: &str) -> DriverResult<Option<String>> {
        let state = self.state.lock();
        let page = state.page.as_ref().ok_or_else(|| self.action_timeout(locator))?;
        let id = self.single(page, locator)?;
        Ok(page.nodes[id].attributes.get(name).cloned())
    }

    async fn is_visible(&self, locator: &Locator) -> DriverResult<bool> {
        let state = self.state.lock();
        let Some(page) = state.page.as_ref() else {
            return Ok(false);
        };
        match page.resolve(locator).as_slice() {
            [] => Ok(false),
            [id] => Ok(page.is_visible(*id)),
            many => Err(DriverError::Action(format!(
                "strict mode violation: {} resolved to {} elements",
                locator,
                many.len()
            ))),
        }
    }

    async fn is_focused(&self, locator: &Locator) -> DriverResult<bool> {
        let state = self.state.lock();
        let Some(page) = state.page.as_ref() else {
            return Ok(false);
        };
        Ok(match (page.resolve(locator).first(), state.focused) {
            (Some(id), Some(focused)) => *id == focused,
            _ => false,
        })
    }

    async fn clear_cookies(&self) -> DriverResult<()> {
        self.state.lock().cookies_cleared += 1;
        Ok(())
    }

    async fn abort_all_requests(&self) -> DriverResult<()> {
        self.state.lock().offline = true;
        Ok(())
    }

    async fn set_geolocation(&self, position: Geolocation) -> DriverResult<()> {
        self.state.lock().geolocation = Some(position);
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &BTreeMap<String, String>) -> DriverResult<()> {
        self.state.lock().headers.extend(headers.clone());
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"fake screenshot")?;
        Ok(())
    }

    async fn start_trace(&self) -> DriverResult<()> {
        self.state.lock().tracing = true;
        Ok(())
    }

    async fn stop_trace(&self, path: &Path) -> DriverResult<()> {
        if !std::mem::take(&mut self.state.lock().tracing) {
            return Err(DriverError::Action("tracing was not started".to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"fake trace")?;
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.state.lock().tracing = false;
        Ok(())
    }
}

/// Hands out `FakeSession`s, optionally failing the first few launches
#[derive(Debug)]
pub struct FakeLauncher {
    site: Arc<FakeSite>,
    failing_launches: AtomicU32,
    launches: Mutex<Vec<SessionOptions>>,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            failing_launches: AtomicU32::new(0),
            launches: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `count` launches fail like a browser that did not start
    pub fn failing_first(self, count: u32) -> Self {
        self.failing_launches.store(count, Ordering::SeqCst);
        self
    }

    pub fn launches(&self) -> Vec<SessionOptions> {
        self.launches.lock().clone()
    }

    pub fn session(&self, options: SessionOptions) -> FakeSession {
        FakeSession::new(Arc::clone(&self.site), options)
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, options: &SessionOptions) -> DriverResult<Box<dyn BrowserDriver>> {
        self.launches.lock().push(options.clone());
        let should_fail = self
            .failing_launches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(DriverError::Bridge("browser failed to start".to_string()));
        }
        Ok(Box::new(self.session(options.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relcheck_common::SuiteConfig;

    const BASE: &str = "https://shop.test";

    fn session(site: FakeSite) -> FakeSession {
        let mut config = SuiteConfig::default();
        config.target.base_url = BASE.to_string();
        FakeSession::new(Arc::new(site), SessionOptions::from_config(&config))
    }

    #[tokio::test]
    async fn search_navigates_to_registered_results() {
        let driver = session(FakeSite::storefront(BASE));
        driver.goto("/").await.unwrap();
        driver
            .fill(&Locator::label(TextMatch::exact(SEARCH_BOX_LABEL)), "wallet")
            .await
            .unwrap();
        driver
            .click(&Locator::role("button", Some(TextMatch::substring("Search"))))
            .await
            .unwrap();
        assert_eq!(
            driver.current_url().await.unwrap(),
            format!("{}{}", BASE, FakeSite::results_path("wallet"))
        );
    }

    #[tokio::test]
    async fn has_not_filters_relative_to_each_candidate() {
        let driver = session(FakeSite::storefront(BASE));
        driver.goto(&FakeSite::results_path("wallet")).await.unwrap();

        let links = Locator::role("link", Some(TextMatch::pattern_i("wallet")));
        assert_eq!(driver.count(&links).await.unwrap(), 2);

        let organic = links.has_not(Locator::text(TextMatch::substring(SPONSORED_LABEL)));
        assert_eq!(driver.count(&organic).await.unwrap(), 1);
        assert_eq!(driver.inner_text(&organic).await.unwrap(), "Genuine wallet listing");
    }

    #[tokio::test]
    async fn strict_actions_reject_ambiguous_locators() {
        let driver = session(FakeSite::storefront(BASE));
        driver.goto("/itm/1001").await.unwrap();
        let prices = Locator::css(ITEM_PRICE_CSS);
        assert!(matches!(driver.inner_text(&prices).await, Err(DriverError::Action(_))));
        assert_eq!(driver.all_inner_texts(&prices).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn missing_elements_time_out_without_waiting() {
        let driver = session(FakeSite::storefront(BASE));
        driver.goto("/").await.unwrap();
        let started = std::time::Instant::now();
        let result = driver
            .wait_for(&Locator::css("#nope"), WaitState::Visible, Duration::from_secs(30))
            .await;
        assert!(result.unwrap_err().is_timeout());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_elements_appear_within_the_wait() {
        let spec = ProductSpec::new("Wallet", "$10").section_delay(Duration::from_secs(2));
        let driver = session(FakeSite::new(BASE).page("/p", FakePage::product(&spec)));
        driver.goto("/p").await.unwrap();

        let heading = Locator::role("heading", Some(TextMatch::substring("Similar")));
        assert!(!driver.is_visible(&heading).await.unwrap());
        assert!(driver
            .wait_for(&heading, WaitState::Visible, Duration::from_secs(1))
            .await
            .unwrap_err()
            .is_timeout());
        driver
            .wait_for(&heading, WaitState::Visible, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(driver.is_visible(&heading).await.unwrap());
    }

    #[tokio::test]
    async fn offline_navigation_fails_onto_an_error_page() {
        let driver = session(FakeSite::storefront(BASE));
        driver.abort_all_requests().await.unwrap();
        let err = driver.goto("/").await.unwrap_err();
        assert!(matches!(err, DriverError::Navigation { .. }));
        let indicator = Locator::text(TextMatch::pattern_i("error|offline|failed")).first();
        assert!(driver.is_visible(&indicator).await.unwrap());
    }

    #[tokio::test]
    async fn offline_page_can_be_replaced() {
        let site = FakeSite::storefront(BASE)
            .offline_page(FakePage::new().with(FakeElement::with_role("heading", "Nothing here")));
        let driver = session(site);
        driver.abort_all_requests().await.unwrap();
        assert!(driver.goto("/").await.is_err());
        let indicator = Locator::text(TextMatch::pattern_i("error|offline|failed")).first();
        assert!(!driver.is_visible(&indicator).await.unwrap());
    }

    #[tokio::test]
    async fn traces_are_written_only_when_started() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces").join("t.zip");
        let driver = session(FakeSite::storefront(BASE));
        assert!(driver.stop_trace(&path).await.is_err());

        driver.start_trace().await.unwrap();
        driver.stop_trace(&path).await.unwrap();
        assert!(path.exists());
        assert!(driver.stop_trace(&path).await.is_err());
    }

    #[tokio::test]
    async fn hidden_items_are_skipped_by_tab() {
        let spec = ProductSpec::new("Wallet", "$10")
            .items([ItemSpec::new("wallet a", "$10").hidden(), ItemSpec::new("wallet b", "$10")]);
        let driver = session(FakeSite::new(BASE).page("/p", FakePage::product(&spec)));
        driver.goto("/p").await.unwrap();
        let rows = Locator::css(RELATED_ITEMS_CSS);
        assert!(!driver.is_visible(&rows.first()).await.unwrap());
        driver.press_key("Tab").await.unwrap();
        assert!(driver.is_focused(&rows.nth(1)).await.unwrap());
    }

    #[tokio::test]
    async fn tab_moves_focus_through_focusable_elements() {
        let driver = session(FakeSite::storefront(BASE));
        driver.goto("/itm/1001").await.unwrap();
        let rows = Locator::css(RELATED_ITEMS_CSS);
        driver.press_key("Tab").await.unwrap();
        assert!(driver.is_focused(&rows.first()).await.unwrap());
        driver.press_key("Tab").await.unwrap();
        assert!(driver.is_focused(&rows.nth(1)).await.unwrap());
    }

    #[tokio::test]
    async fn en_gb_sessions_see_pounds() {
        let driver = session(FakeSite::storefront(BASE));
        let mut headers = BTreeMap::new();
        headers.insert("Accept-Language".to_string(), "en-GB".to_string());
        driver.set_extra_headers(&headers).await.unwrap();
        driver.goto("/itm/1001").await.unwrap();
        let prices = driver.all_inner_texts(&Locator::css(ITEM_PRICE_CSS)).await.unwrap();
        assert!(prices.iter().all(|p| p.starts_with('£')), "{:?}", prices);
    }

    #[tokio::test]
    async fn launcher_failures_are_consumed_in_order() {
        let launcher = FakeLauncher::new(FakeSite::storefront(BASE)).failing_first(1);
        let options = SessionOptions::from_config(&SuiteConfig::default());
        assert!(launcher.launch(&options).await.is_err());
        assert!(launcher.launch(&options).await.is_ok());
        assert_eq!(launcher.launches().len(), 2);
    }
}
