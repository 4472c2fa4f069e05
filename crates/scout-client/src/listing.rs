use std::path::PathBuf;

use scout_core::error::AppError;
use scout_core::models::{ScrapeQuery, ScrapedRecord, ToolKind};
use scout_core::site::Site;
use scout_core::traits::{Fetcher, SiteFetcher};

use crate::extract::{detect_block, dump_html, extract_listings};

/// Scrapes a listing site's search page with any [`Fetcher`].
///
/// The same tool runs over plain HTTP ([`ToolKind::Http`]) or a headless
/// browser ([`ToolKind::Browser`]); only the fetcher differs.
#[derive(Clone)]
pub struct ListingTool<F> {
    fetcher: F,
    tool: ToolKind,
    dump_dir: Option<PathBuf>,
}

impl<F: Fetcher> ListingTool<F> {
    pub fn new(fetcher: F, tool: ToolKind) -> Self {
        Self {
            fetcher,
            tool,
            dump_dir: None,
        }
    }

    /// Save pages that yield no listings under `dir`.
    pub fn with_dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dump_dir = dir;
        self
    }
}

impl<F: Fetcher> SiteFetcher for ListingTool<F> {
    fn tool(&self) -> ToolKind {
        self.tool
    }

    fn supports(&self, site: Site) -> bool {
        site.is_listing()
    }

    fn request_host(&self, site: Site) -> String {
        site.host().unwrap_or(site.as_str()).to_string()
    }

    async fn fetch(
        &self,
        site: Site,
        query: &ScrapeQuery,
        _max_results: usize,
    ) -> Result<Vec<ScrapedRecord>, AppError> {
        let url = site.search_url(&query.query, 1)?;
        tracing::debug!(tool = %self.tool, %site, %url, "Fetching search page");
        let html = self.fetcher.fetch(&url).await?;

        let records = extract_listings(site, &html)?;
        if !records.is_empty() {
            return Ok(records);
        }

        if let Some(dir) = &self.dump_dir {
            match dump_html(dir, site, &html).await {
                Ok(path) => tracing::info!(%site, path = %path.display(), "Dumped page without listings"),
                Err(e) => tracing::warn!(%site, error = %e, "Failed to dump page"),
            }
        }

        if let Some(marker) = detect_block(&html) {
            return Err(AppError::Blocked {
                site: site.display_name().to_string(),
                reason: format!("page mentions '{marker}'"),
            });
        }
        Ok(records)
    }
}
