/// Smoke test for the browser listing tool.
///
/// Launches headless Chromium, scrapes one listing site and prints what the
/// extractor found.
///
/// Run with:
///   cargo run -p scout-client --example browser_smoke --features browser -- hemmings "1967 Mustang"
use scout_client::{BrowserFetcher, ListingTool};
use scout_core::models::{QueryType, ScrapeQuery, ToolKind};
use scout_core::site::Site;
use scout_core::traits::SiteFetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut args = std::env::args().skip(1);
    let site: Site = args
        .next()
        .as_deref()
        .unwrap_or("classiccars")
        .parse()
        .map_err(anyhow::Error::msg)?;
    let query = args.next().unwrap_or_else(|| "Mustang".to_string());

    println!("Launching headless browser…");
    let tool = ListingTool::new(BrowserFetcher::new().await?, ToolKind::Browser)
        .with_dump_dir(Some("scout-dumps".into()));

    let records = tool
        .fetch(site, &ScrapeQuery::new(query, QueryType::Vehicle), 20)
        .await?;

    println!("{} listings on {}", records.len(), site.display_name());
    for record in &records {
        println!(
            "  {} | {} | {}",
            record.title,
            record.price_text.as_deref().unwrap_or("-"),
            record.url.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
