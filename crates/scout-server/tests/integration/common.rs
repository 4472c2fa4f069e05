use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use scout_core::testutil::MockSiteFetcher;
use scout_core::{
    BatchConfig, ChainConfig, FallbackChain, HostThrottle, MemoryStore, ScrapeOrchestrator,
    ThrottleConfig,
};
use scout_server::routes;
use scout_server::state::AppState;

pub type TestOrchestrator = ScrapeOrchestrator<MockSiteFetcher, MemoryStore>;

pub struct TestApp {
    pub router: Router,
    pub orchestrator: TestOrchestrator,
    pub store: MemoryStore,
}

/// Router over mock strategies and an in-memory store, with throttling off.
pub fn setup_test_app(tools: Vec<MockSiteFetcher>) -> TestApp {
    let store = MemoryStore::new();
    let chain = FallbackChain::new(
        tools,
        HostThrottle::new(ThrottleConfig::disabled()),
        ChainConfig::default(),
    );
    let orchestrator =
        ScrapeOrchestrator::from_chain(chain, store.clone(), BatchConfig::default()).unwrap();
    let state = Arc::new(AppState::new(orchestrator.clone()));

    TestApp {
        router: routes::router(state),
        orchestrator,
        store,
    }
}

pub async fn get(app: &TestApp, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read_json(response).await
}

pub async fn post_json(
    app: &TestApp,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_raw(app, uri, serde_json::to_vec(body).unwrap()).await
}

pub async fn post_raw(app: &TestApp, uri: &str, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

async fn read_json(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap();
    (status, json)
}
