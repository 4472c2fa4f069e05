#[cfg(feature = "browser")]
pub mod browser_fetcher;
pub mod extract;
pub mod fetcher;
pub mod listing;
pub mod search;
pub mod strategy;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
pub use fetcher::ReqwestFetcher;
pub use listing::ListingTool;
pub use search::{SearchApi, SearchTool};
pub use strategy::{Strategy, build_strategies};
