use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;

/// A source the pipeline can scrape.
///
/// The three listing sites are classic-car marketplaces with their own search
/// pages; `Web` is the open web, reachable only through search API tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    ClassicCars,
    BringATrailer,
    Hemmings,
    Web,
}

impl Site {
    /// Every listing site, in the order `all` expands to.
    pub const LISTING: [Site; 3] = [Site::ClassicCars, Site::BringATrailer, Site::Hemmings];

    pub fn as_str(&self) -> &'static str {
        match self {
            Site::ClassicCars => "classiccars",
            Site::BringATrailer => "bringatrailer",
            Site::Hemmings => "hemmings",
            Site::Web => "web",
        }
    }

    /// Human-readable name, used as the `source` of extracted records.
    pub fn display_name(&self) -> &'static str {
        match self {
            Site::ClassicCars => "ClassicCars.com",
            Site::BringATrailer => "BringATrailer.com",
            Site::Hemmings => "Hemmings.com",
            Site::Web => "Web",
        }
    }

    /// Host serving the site's pages. `None` for the open web.
    pub fn host(&self) -> Option<&'static str> {
        match self {
            Site::ClassicCars => Some("classiccars.com"),
            Site::BringATrailer => Some("bringatrailer.com"),
            Site::Hemmings => Some("www.hemmings.com"),
            Site::Web => None,
        }
    }

    pub fn is_listing(&self) -> bool {
        !matches!(self, Site::Web)
    }

    /// Base URL used to resolve relative links found on the site.
    pub fn origin(&self) -> Option<String> {
        self.host().map(|h| format!("https://{h}"))
    }

    /// Build the search-results URL for a query (1-indexed page).
    pub fn search_url(&self, query: &str, page: u32) -> Result<String, AppError> {
        let (base, page_param) = match self {
            Site::ClassicCars => ("https://classiccars.com/listings/find", "p"),
            Site::BringATrailer => ("https://bringatrailer.com/search/", "page"),
            Site::Hemmings => ("https://www.hemmings.com/classifieds", "page"),
            Site::Web => {
                return Err(AppError::ValidationError(
                    "The open web has no search page of its own".into(),
                ));
            }
        };
        let page = page.max(1).to_string();
        let url = Url::parse_with_params(base, &[("q", query), (page_param, page.as_str())])
            .map_err(|e| AppError::Generic(format!("Invalid search URL for {self}: {e}")))?;
        Ok(url.into())
    }

    /// Parse a list of user-supplied site names, expanding `all` and
    /// removing repeats while keeping first-seen order.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Site>, AppError> {
        let mut sites = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            let expanded: Vec<Site> = if name.eq_ignore_ascii_case("all") {
                Site::LISTING.to_vec()
            } else {
                vec![name.parse().map_err(AppError::ValidationError)?]
            };
            for site in expanded {
                if !sites.contains(&site) {
                    sites.push(site);
                }
            }
        }
        Ok(sites)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classiccars" | "classiccars.com" => Ok(Site::ClassicCars),
            "bringatrailer" | "bringatrailer.com" | "bat" => Ok(Site::BringATrailer),
            "hemmings" | "hemmings.com" => Ok(Site::Hemmings),
            "web" => Ok(Site::Web),
            _ => Err(format!("Unknown site: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_to_the_same_site() {
        assert_eq!("bat".parse::<Site>().unwrap(), Site::BringATrailer);
        assert_eq!("BringATrailer.com".parse::<Site>().unwrap(), Site::BringATrailer);
        assert_eq!("classiccars.com".parse::<Site>().unwrap(), Site::ClassicCars);
        assert!("ebay".parse::<Site>().is_err());
    }

    #[test]
    fn all_expands_to_listing_sites_without_repeats() {
        let sites = Site::parse_list(&["hemmings", "all"]).unwrap();
        assert_eq!(
            sites,
            vec![Site::Hemmings, Site::ClassicCars, Site::BringATrailer]
        );
    }

    #[test]
    fn unknown_site_is_a_validation_error() {
        let err = Site::parse_list(&["craigslist"]).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[test]
    fn search_url_encodes_query() {
        let url = Site::ClassicCars.search_url("1967 Mustang", 1).unwrap();
        assert_eq!(
            url,
            "https://classiccars.com/listings/find?q=1967+Mustang&p=1"
        );
        let url = Site::Hemmings.search_url("GTO & Judge", 2).unwrap();
        assert!(url.starts_with("https://www.hemmings.com/classifieds?q=GTO+%26+Judge"));
        assert!(url.ends_with("page=2"));
    }

    #[test]
    fn web_has_no_search_page() {
        assert!(Site::Web.search_url("car shows", 1).is_err());
        assert!(Site::Web.host().is_none());
        assert!(!Site::Web.is_listing());
    }
}
