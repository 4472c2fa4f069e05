use scout_core::config::ScraperConfig;
use scout_core::error::AppError;
use scout_core::models::{ScrapeQuery, ScrapedRecord, ToolKind};
use scout_core::site::Site;
use scout_core::traits::SiteFetcher;

#[cfg(feature = "browser")]
use crate::browser_fetcher::BrowserFetcher;
use crate::fetcher::ReqwestFetcher;
use crate::listing::ListingTool;
use crate::search::{SearchApi, SearchTool};

/// Every concrete scraping strategy, so one fallback chain can hold them all.
#[derive(Clone)]
pub enum Strategy {
    Http(ListingTool<ReqwestFetcher>),
    Search(SearchTool),
    #[cfg(feature = "browser")]
    Browser(ListingTool<BrowserFetcher>),
}

impl SiteFetcher for Strategy {
    fn tool(&self) -> ToolKind {
        match self {
            Strategy::Http(t) => t.tool(),
            Strategy::Search(t) => t.tool(),
            #[cfg(feature = "browser")]
            Strategy::Browser(t) => t.tool(),
        }
    }

    fn is_configured(&self) -> bool {
        match self {
            Strategy::Http(t) => t.is_configured(),
            Strategy::Search(t) => t.is_configured(),
            #[cfg(feature = "browser")]
            Strategy::Browser(t) => t.is_configured(),
        }
    }

    fn supports(&self, site: Site) -> bool {
        match self {
            Strategy::Http(t) => t.supports(site),
            Strategy::Search(t) => t.supports(site),
            #[cfg(feature = "browser")]
            Strategy::Browser(t) => t.supports(site),
        }
    }

    fn request_host(&self, site: Site) -> String {
        match self {
            Strategy::Http(t) => t.request_host(site),
            Strategy::Search(t) => t.request_host(site),
            #[cfg(feature = "browser")]
            Strategy::Browser(t) => t.request_host(site),
        }
    }

    async fn fetch(
        &self,
        site: Site,
        query: &ScrapeQuery,
        max_results: usize,
    ) -> Result<Vec<ScrapedRecord>, AppError> {
        match self {
            Strategy::Http(t) => t.fetch(site, query, max_results).await,
            Strategy::Search(t) => t.fetch(site, query, max_results).await,
            #[cfg(feature = "browser")]
            Strategy::Browser(t) => t.fetch(site, query, max_results).await,
        }
    }
}

/// Build the strategies named by `config.tool_order`, in that order.
///
/// Search tools without an API key are still built (the chain skips them and
/// reports them as unconfigured). The browser tool is left out when the
/// `browser` feature is off or Chromium fails to launch.
pub async fn build_strategies(config: &ScraperConfig) -> Result<Vec<Strategy>, AppError> {
    let mut strategies = Vec::with_capacity(config.tool_order.len());
    for tool in &config.tool_order {
        match tool {
            ToolKind::Http => {
                let fetcher = ReqwestFetcher::with_timeout(config.fetch_timeout)?;
                strategies.push(Strategy::Http(
                    ListingTool::new(fetcher, ToolKind::Http).with_dump_dir(config.debug_dump_dir.clone()),
                ));
            }
            ToolKind::Firecrawl => strategies.push(Strategy::Search(SearchTool::new(
                SearchApi::Firecrawl,
                config.firecrawl_api_key.clone(),
                config.fetch_timeout,
            )?)),
            ToolKind::Brave => strategies.push(Strategy::Search(SearchTool::new(
                SearchApi::Brave,
                config.brave_api_key.clone(),
                config.fetch_timeout,
            )?)),
            ToolKind::Apify => strategies.push(Strategy::Search(SearchTool::new(
                SearchApi::Apify,
                config.apify_api_key.clone(),
                config.fetch_timeout,
            )?)),
            ToolKind::Jina => strategies.push(Strategy::Search(SearchTool::new(
                SearchApi::Jina,
                config.jina_api_key.clone(),
                config.fetch_timeout,
            )?)),
            ToolKind::Browser => {
                if let Some(strategy) = browser_strategy(config).await {
                    strategies.push(strategy);
                }
            }
        }
    }
    tracing::info!(
        tools = ?strategies.iter().map(|s| s.tool()).collect::<Vec<_>>(),
        "Scraping strategies built"
    );
    Ok(strategies)
}

#[cfg(feature = "browser")]
async fn browser_strategy(config: &ScraperConfig) -> Option<Strategy> {
    match BrowserFetcher::with_timeout(config.fetch_timeout).await {
        Ok(fetcher) => Some(Strategy::Browser(
            ListingTool::new(fetcher, ToolKind::Browser).with_dump_dir(config.debug_dump_dir.clone()),
        )),
        Err(e) => {
            tracing::warn!(error = %e, "Browser tool disabled");
            None
        }
    }
}

#[cfg(not(feature = "browser"))]
async fn browser_strategy(_config: &ScraperConfig) -> Option<Strategy> {
    tracing::warn!("Browser tool requested but scout-client was built without the `browser` feature");
    None
}
