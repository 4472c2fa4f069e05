use scout_core::dedup::fingerprint;
use scout_core::error::AppError;
use scout_core::models::{QueryType, ScrapedRecord};
use scout_core::normalize::normalize_record;
use scout_core::traits::RecordStore;
use scout_db::RecordRepository;

use crate::integration::common::setup_test_db;

fn mustang() -> ScrapedRecord {
    let mut record = ScrapedRecord::new(
        QueryType::Vehicle,
        "1967 Ford Mustang Fastback",
        "ClassicCars.com",
    )
    .with_url("https://classiccars.com/listings/view/1789012")
    .with_location("Dallas, Texas");
    record.price_text = Some("$64,500".into());
    normalize_record(record)
}

#[tokio::test]
async fn insert_and_find_by_fingerprint() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    let record = mustang();
    let fp = fingerprint(&record);
    let stored = repo.insert(&record, &fp).await.unwrap();
    assert!(!stored.id.is_nil());
    assert_eq!(stored.fingerprint, fp);

    let found = repo
        .find_by_fingerprint(&fp)
        .await
        .unwrap()
        .expect("Should find the record");
    assert_eq!(found.title, "1967 Ford Mustang Fastback");
    assert_eq!(found.year, Some(1967));
    assert_eq!(found.make.as_deref(), Some("Ford"));
    assert_eq!(found.price, Some(64500));
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn second_insert_of_a_fingerprint_is_duplicate() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    let record = mustang();
    let fp = fingerprint(&record);
    repo.insert(&record, &fp).await.unwrap();

    let relisted = ScrapedRecord {
        title: "1967 Ford Mustang Fastback (price drop)".into(),
        ..record
    };
    let err = repo.insert(&relisted, &fp).await.unwrap_err();
    assert!(matches!(err, AppError::Duplicate(ref f) if *f == fp));
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn unknown_fingerprint_finds_nothing() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    assert!(repo.find_by_fingerprint("0".repeat(64).as_str()).await.unwrap().is_none());
    repo.health_check().await.unwrap();
}

#[tokio::test]
async fn stores_every_record_type() {
    let (pool, _container) = setup_test_db().await;
    let repo = RecordRepository::new(pool);

    let records = [
        ScrapedRecord::new(QueryType::Event, "Hot Rod Nationals", "brave")
            .with_date("2026-06-12")
            .with_location("Columbus, OH"),
        ScrapedRecord::new(QueryType::Article, "Mustang history", "jina")
            .with_url("https://example.com/mustang-history"),
        ScrapedRecord::new(QueryType::General, "Classic car insurance", "firecrawl"),
    ];
    for record in &records {
        repo.insert(record, &fingerprint(record)).await.unwrap();
    }
    assert_eq!(repo.count().await.unwrap(), 3);
}
