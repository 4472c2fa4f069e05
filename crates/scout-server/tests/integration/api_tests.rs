use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use scout_core::testutil::{MockSiteFetcher, make_listings};
use scout_core::{AppError, ToolKind};

use crate::integration::common::{TestApp, get, post_json, post_raw, setup_test_app};

fn listing_tool(n: usize) -> MockSiteFetcher {
    MockSiteFetcher::new(ToolKind::Http).with_records(make_listings(0, n))
}

async fn wait_for_terminal(app: &TestApp, job_id: &str) -> serde_json::Value {
    for _ in 0..200 {
        let (status, json) = get(app, &format!("/api/playwright-scraper/status/{job_id}")).await;
        assert_eq!(status, StatusCode::OK);
        let state = json["job"]["status"].as_str().unwrap().to_string();
        if state == "completed" || state == "failed" {
            return json["job"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app(vec![listing_tool(1)]);

    let (status, json) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["storage"], "memory");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app(vec![listing_tool(1)]);

    let (status, json) = get(&app, "/api-docs/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["info"]["title"], "Scout API");
}

// ---------------------------------------------------------------------------
// /api/scraper/scrape
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scrape_caps_results_at_max_results() {
    let app = setup_test_app(vec![listing_tool(7)]);

    let (status, json) = post_json(
        &app,
        "/api/scraper/scrape",
        &json!({"query": "1967 Mustang", "type": "vehicle", "maxResults": 3, "sites": ["classiccars"]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["tool"], "http");
    assert_eq!(json["data"].as_array().unwrap().len(), 3);
    assert_eq!(json["metadata"]["resultsCount"], 3);
}

#[tokio::test]
async fn scrape_falls_back_to_the_next_tool() {
    let failing = MockSiteFetcher::new(ToolKind::Http)
        .with_error(AppError::NetworkError("connection reset".into()));
    let backup = MockSiteFetcher::new(ToolKind::Brave).with_records(make_listings(0, 2));
    let app = setup_test_app(vec![failing, backup]);

    let (status, json) = post_json(
        &app,
        "/api/scraper/scrape",
        &json!({"query": "1967 Mustang", "type": "vehicle", "sites": ["hemmings"]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tool"], "brave");
    let attempts = json["metadata"]["attempts"].as_array().unwrap();
    assert_eq!(attempts[0]["tool"], "http");
    assert_eq!(attempts[0]["success"], false);
}

#[tokio::test]
async fn scrape_returns_500_when_every_tool_fails() {
    let failing = MockSiteFetcher::new(ToolKind::Http)
        .with_error(AppError::RateLimitExceeded("HTTP 429".into()));
    let app = setup_test_app(vec![failing]);

    let (status, json) = post_json(
        &app,
        "/api/scraper/scrape",
        &json!({"query": "1967 Mustang", "type": "vehicle"}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
    assert!(json["metadata"].is_object());
}

#[tokio::test]
async fn malformed_body_returns_400() {
    let app = setup_test_app(vec![listing_tool(1)]);

    let (status, json) = post_raw(&app, "/api/scraper/scrape", b"{not json".to_vec()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn invalid_query_returns_400_without_fetching() {
    let tool = listing_tool(1);
    let app = setup_test_app(vec![tool.clone()]);

    for body in [
        json!({"query": "Mustang", "maxResults": 0}),
        json!({"query": "Mustang", "maxResults": 101}),
        json!({"query": "   "}),
        json!({"query": "Mustang", "type": "boat"}),
    ] {
        let (status, json) = post_json(&app, "/api/scraper/scrape", &body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(json["success"], false);
    }
    assert_eq!(tool.call_count(), 0);
}

// ---------------------------------------------------------------------------
// Batch jobs, stats and cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_keeps_going_past_a_failing_query() {
    let tool = MockSiteFetcher::new(ToolKind::Http).with_handler(|site, query| {
        match query.query.as_str() {
            "Camaro" => Err(AppError::ParseError("no listing cards".into())),
            "Mustang" => Ok(make_listings(0, 2)),
            _ => Ok(make_listings(100 + site as usize, 1)),
        }
    });
    let app = setup_test_app(vec![tool]);

    let (status, json) = post_json(
        &app,
        "/api/scraper/batch",
        &json!({"queries": [
            {"query": "Mustang", "type": "vehicle", "sites": ["classiccars"]},
            {"query": "Camaro", "type": "vehicle", "sites": ["classiccars"]},
            {"query": "Corvette", "type": "vehicle", "sites": ["classiccars"]}
        ]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let job = &json["result"];
    assert_eq!(job["status"], "completed");
    assert_eq!(job["kind"], "batch");
    assert_eq!(job["errors"].as_array().unwrap().len(), 1);
    assert_eq!(job["totalSaved"], 3);
    assert!(job["duration"].is_number());
    assert_eq!(app.store.len(), 3);
}

#[tokio::test]
async fn batch_rejects_an_empty_query_list() {
    let app = setup_test_app(vec![listing_tool(1)]);

    let (status, json) = post_json(&app, "/api/scraper/batch", &json!({"queries": []})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(app.orchestrator.list_jobs(None).is_empty());
}

#[tokio::test]
async fn batch_jobs_are_listed_and_fetched_by_id() {
    let app = setup_test_app(vec![listing_tool(1)]);
    let (_, created) = post_json(
        &app,
        "/api/scraper/batch",
        &json!({"queries": [{"query": "Mustang", "type": "vehicle"}]}),
    )
    .await;
    let job_id = created["result"]["id"].as_str().unwrap().to_string();

    let (status, list) = get(&app, "/api/scraper/jobs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["jobs"][0]["id"], job_id.as_str());

    let (status, single) = get(&app, &format!("/api/scraper/jobs/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(single["job"]["id"], job_id.as_str());

    let (status, missing) = get(&app, "/api/scraper/jobs/batch_missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["success"], false);
    assert!(missing["error"].as_str().unwrap().contains("Job not found"));
}

#[tokio::test]
async fn stats_and_clear_cache() {
    let app = setup_test_app(vec![listing_tool(4)]);
    post_json(
        &app,
        "/api/scraper/batch",
        &json!({"queries": [{"query": "Mustang", "type": "vehicle", "sites": ["hemmings"]}]}),
    )
    .await;

    let (status, stats) = get(&app, "/api/scraper/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["stats"]["cacheSize"], 4);
    assert_eq!(stats["stats"]["tools"][0]["tool"], "http");
    assert_eq!(stats["stats"]["tools"][0]["successes"], 1);
    assert_eq!(stats["stats"]["jobs"]["completed"], 1);

    let (status, cleared) = post_json(&app, "/api/scraper/clear-cache", &json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["success"], true);
    assert_eq!(cleared["cleared"], 4);

    let (_, stats) = get(&app, "/api/scraper/stats").await;
    assert_eq!(stats["stats"]["cacheSize"], 0);
}

// ---------------------------------------------------------------------------
// /api/playwright-scraper
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_job_runs_in_background() {
    let tool = listing_tool(3).with_delay(Duration::from_millis(20));
    let app = setup_test_app(vec![tool]);

    let (status, json) = post_json(
        &app,
        "/api/playwright-scraper/scrape",
        &json!({"query": "1967 Mustang", "sites": ["classiccars", "hemmings"], "maxListings": 10}),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["success"], true);
    assert_eq!(json["status"], "pending");
    let job_id = json["jobId"].as_str().unwrap().to_string();
    assert!(job_id.starts_with("job_"));

    let job = wait_for_terminal(&app, &job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["query"], "1967 Mustang");
    assert_eq!(job["sites"], json!(["classiccars", "hemmings"]));
    assert_eq!(job["totalFound"], 6);
    assert_eq!(job["totalSaved"], 3);
    assert!(job["endTime"].is_string());
    assert!(job["duration"].is_number());

    let (_, list) = get(&app, "/api/playwright-scraper/jobs").await;
    assert_eq!(list["total"], 1);
    let (_, batch_list) = get(&app, "/api/scraper/jobs").await;
    assert_eq!(batch_list["total"], 0);
}

#[tokio::test]
async fn listing_job_status_is_404_for_unknown_id() {
    let app = setup_test_app(vec![listing_tool(1)]);

    let (status, json) = get(&app, "/api/playwright-scraper/status/job_missing").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn listing_job_rejects_unknown_sites() {
    let app = setup_test_app(vec![listing_tool(1)]);

    let (status, json) = post_json(
        &app,
        "/api/playwright-scraper/scrape",
        &json!({"query": "Mustang", "sites": ["ebay"]}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn quick_scrape_skips_listings_seen_in_a_prior_run() {
    // First run finds 2 listings; later runs find those 2 plus 5 new ones.
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let tool = MockSiteFetcher::new(ToolKind::Http).with_handler(move |_, _| {
        match counter.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(make_listings(0, 2)),
            _ => Ok(make_listings(0, 7)),
        }
    });
    let app = setup_test_app(vec![tool]);
    let body = json!({"query": "1967 Mustang", "sites": ["classiccars"], "maxListings": 5});

    let (_, first) = post_json(&app, "/api/playwright-scraper/quick-scrape", &body).await;
    assert_eq!(first["saved"], 2);

    let (status, json) = post_json(&app, "/api/playwright-scraper/quick-scrape", &body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["query"], "1967 Mustang");
    assert_eq!(json["sites"], json!(["classiccars"]));
    assert_eq!(json["found"], 7);
    assert_eq!(json["saved"], 5);
    assert_eq!(json["errors"], json!([]));
    assert_eq!(app.store.len(), 7);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn quick_scrape_reports_blocked_sites() {
    let tool = MockSiteFetcher::new(ToolKind::Browser).with_handler(|site, _| match site {
        scout_core::Site::BringATrailer => Err(AppError::Blocked {
            site: "BringATrailer.com".into(),
            reason: "captcha".into(),
        }),
        _ => Ok(make_listings(site as usize * 10, 2)),
    });
    let app = setup_test_app(vec![tool]);

    let (status, json) = post_json(
        &app,
        "/api/playwright-scraper/quick-scrape",
        &json!({"query": "Porsche 911"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sites"], json!(["classiccars", "bringatrailer", "hemmings"]));
    assert_eq!(json["saved"], 4);
    let errors = json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().contains("BringATrailer"));
}

#[tokio::test(start_paused = true)]
async fn quick_scrape_returns_once_shutdown_begins() {
    let tool = listing_tool(2).with_delay(Duration::from_secs(300));
    let app = setup_test_app(vec![tool]);
    let body = json!({"query": "Mustang", "sites": ["classiccars"]});

    let started = tokio::time::Instant::now();
    let ((status, json), ()) = tokio::join!(
        post_json(&app, "/api/playwright-scraper/quick-scrape", &body),
        async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            app.orchestrator.begin_shutdown();
        }
    );

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["saved"], 0);
    let errors = json["errors"].as_array().unwrap();
    assert!(errors.iter().any(|e| e.as_str().unwrap().contains("shutting down")));
}
