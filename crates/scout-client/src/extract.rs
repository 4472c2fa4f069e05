//! Listing-card extraction for the classic-car marketplaces.
//!
//! Each listing site gets a set of CSS selectors describing its search result
//! cards. Several alternatives are listed per field because the sites change
//! markup between redesigns and A/B tests.

use std::path::{Path, PathBuf};

use scout_core::error::AppError;
use scout_core::models::{QueryType, ScrapedRecord};
use scout_core::normalize::{clean_text, parse_price, parse_year};
use scout_core::site::Site;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Selectors for one site's search result cards. Field selectors are
/// evaluated inside a card.
#[derive(Debug, Clone, Copy)]
pub struct CardSelectors {
    pub card: &'static str,
    pub title: &'static str,
    pub price: &'static str,
    pub location: Option<&'static str>,
    pub stock_number: Option<&'static str>,
    pub link: &'static str,
    pub image: &'static str,
}

impl CardSelectors {
    pub fn for_site(site: Site) -> Option<Self> {
        match site {
            Site::ClassicCars => Some(Self {
                card: r#"[data-testid="listing-card"], .listing-item, .vehicle-card, .result-item"#,
                title: "h3, h2, .title, .vehicle-title",
                price: r#".price, .asking-price, [data-testid="price"]"#,
                location: Some(".location, .seller-location"),
                stock_number: Some(r#".stock-number, [data-testid="stock-number"]"#),
                link: "a[href]",
                image: "img[src]",
            }),
            Site::BringATrailer => Some(Self {
                card: ".listing-item, .auction-item, article",
                title: "h2, h3, .title",
                price: ".price, .current-bid",
                location: Some(".location"),
                stock_number: None,
                link: "a[href]",
                image: "img[src]",
            }),
            Site::Hemmings => Some(Self {
                card: ".vehicle-card, .listing-card, .classified-item",
                title: "h3, h2, .title",
                price: ".price",
                location: Some(".location, .seller-location"),
                stock_number: Some(".stock-number"),
                link: "a[href]",
                image: "img[src]",
            }),
            Site::Web => None,
        }
    }
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::ParseError(format!("Invalid selector '{css}': {e}")))
}

/// Cleaned text of the first element inside `card` matching `sel`.
fn first_text(card: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    card.select(sel)
        .next()
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn first_attr(card: &ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    card.select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Resolve a possibly relative link against the site origin.
fn absolute_url(base: &Url, href: &str) -> Option<String> {
    base.join(href)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| u.to_string())
}

/// Extract vehicle listings from a search results page.
///
/// Cards without a title or a link are ignored. Year and price are parsed
/// here; make and model are left to record normalization.
pub fn extract_listings(site: Site, html: &str) -> Result<Vec<ScrapedRecord>, AppError> {
    let selectors = CardSelectors::for_site(site).ok_or_else(|| {
        AppError::ValidationError(format!("{site} has no listing extractor"))
    })?;
    let origin = site
        .origin()
        .ok_or_else(|| AppError::ValidationError(format!("{site} has no origin")))?;
    let base = Url::parse(&origin).map_err(|e| AppError::ParseError(e.to_string()))?;

    let card_sel = selector(selectors.card)?;
    let title_sel = selector(selectors.title)?;
    let price_sel = selector(selectors.price)?;
    let location_sel = selectors.location.map(selector).transpose()?;
    let stock_sel = selectors.stock_number.map(selector).transpose()?;
    let link_sel = selector(selectors.link)?;
    let image_sel = selector(selectors.image)?;

    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for card in document.select(&card_sel) {
        let Some(title) = first_text(&card, &title_sel) else {
            continue;
        };
        let Some(url) = first_attr(&card, &link_sel, "href").and_then(|h| absolute_url(&base, &h))
        else {
            continue;
        };

        let mut record = ScrapedRecord::new(QueryType::Vehicle, title, site.display_name()).with_url(url);
        record.year = parse_year(&record.title);
        record.price_text = first_text(&card, &price_sel);
        record.price = record.price_text.as_deref().and_then(parse_price);
        record.location = location_sel.as_ref().and_then(|s| first_text(&card, s));
        record.stock_number = stock_sel
            .as_ref()
            .and_then(|s| first_text(&card, s))
            .map(|s| s.trim_start_matches("Stock #").trim_start_matches("Stock:").trim().to_string())
            .filter(|s| !s.is_empty());
        record.images = first_attr(&card, &image_sel, "src")
            .and_then(|src| absolute_url(&base, &src))
            .into_iter()
            .collect();
        records.push(record);
    }

    Ok(records)
}

const BLOCK_MARKERS: &[&str] = &[
    "captcha",
    "access denied",
    "unusual traffic",
    "security check",
    "verify you are human",
    "are you a robot",
];

/// Bot-detection marker found in a page, if any.
pub fn detect_block(html: &str) -> Option<&'static str> {
    let lower = html.to_lowercase();
    BLOCK_MARKERS.iter().copied().find(|m| lower.contains(m))
}

/// Write a page that produced no listings to `dir` for later inspection.
pub async fn dump_html(dir: &Path, site: Site, html: &str) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Generic(format!("Cannot create dump dir {}: {e}", dir.display())))?;
    let name = format!("{}-{}.html", site, chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"));
    let path = dir.join(name);
    tokio::fs::write(&path, html)
        .await
        .map_err(|e| AppError::Generic(format!("Cannot write {}: {e}", path.display())))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSICCARS_PAGE: &str = r#"
        <html><body>
          <div data-testid="listing-card">
            <a href="/listings/view/1789012/1967-ford-mustang-for-sale">
              <img src="/img/1789012.jpg">
              <h3>  1967 Ford   Mustang Fastback </h3>
            </a>
            <span class="price">$64,500</span>
            <span class="location">Dallas, Texas</span>
            <span class="stock-number">Stock # CC-1789012</span>
          </div>
          <div data-testid="listing-card">
            <a href="https://classiccars.com/listings/view/1790001">
              <h3>1969 Chevrolet Camaro SS</h3>
            </a>
            <span class="price">Call for price</span>
          </div>
          <div data-testid="listing-card"><h3>No link here</h3></div>
        </body></html>
    "#;

    #[test]
    fn extracts_classiccars_cards() {
        let records = extract_listings(Site::ClassicCars, CLASSICCARS_PAGE).unwrap();
        assert_eq!(records.len(), 2);

        let mustang = &records[0];
        assert_eq!(mustang.title, "1967 Ford Mustang Fastback");
        assert_eq!(mustang.source, "ClassicCars.com");
        assert_eq!(
            mustang.url.as_deref(),
            Some("https://classiccars.com/listings/view/1789012/1967-ford-mustang-for-sale")
        );
        assert_eq!(mustang.year, Some(1967));
        assert_eq!(mustang.price, Some(64500));
        assert_eq!(mustang.location.as_deref(), Some("Dallas, Texas"));
        assert_eq!(mustang.stock_number.as_deref(), Some("CC-1789012"));
        assert_eq!(mustang.images, vec!["https://classiccars.com/img/1789012.jpg"]);

        let camaro = &records[1];
        assert_eq!(camaro.price, None);
        assert_eq!(camaro.price_text.as_deref(), Some("Call for price"));
    }

    #[test]
    fn extracts_bringatrailer_articles() {
        let html = r#"
            <article>
              <a href="/listing/1965-porsche-911-12/"><h3>1965 Porsche 911</h3></a>
              <span class="current-bid">Bid: $210,000</span>
            </article>
        "#;
        let records = extract_listings(Site::BringATrailer, html).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].url.as_deref(),
            Some("https://bringatrailer.com/listing/1965-porsche-911-12/")
        );
        assert_eq!(records[0].price, Some(210000));
    }

    #[test]
    fn hemmings_links_resolve_against_www_host() {
        let html = r#"<div class="classified-item"><h2>1957 Chevrolet Bel Air</h2>
                      <a href="/classifieds/cars-for-sale/chevrolet/bel-air/2810">view</a></div>"#;
        let records = extract_listings(Site::Hemmings, html).unwrap();
        assert_eq!(
            records[0].url.as_deref(),
            Some("https://www.hemmings.com/classifieds/cars-for-sale/chevrolet/bel-air/2810")
        );
    }

    #[test]
    fn web_has_no_extractor() {
        assert!(matches!(
            extract_listings(Site::Web, "<html></html>"),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn detects_block_pages() {
        assert_eq!(
            detect_block("<title>Access Denied</title><p>Reference #18</p>"),
            Some("access denied")
        );
        assert_eq!(
            detect_block("<div class='g-recaptcha'>Please complete the CAPTCHA</div>"),
            Some("captcha")
        );
        assert_eq!(detect_block(CLASSICCARS_PAGE), None);
    }

    #[tokio::test]
    async fn dumps_html_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dump_html(&dir.path().join("dumps"), Site::Hemmings, "<html>empty</html>")
            .await
            .unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("hemmings-"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<html>empty</html>");
    }
}
