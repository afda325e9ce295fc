// tests/reclassify_store.rs
//
// Reclassification against both store backends, plus a rules file on disk.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use stock_news_sentiment::analyze::rules::HotReloadRules;
use stock_news_sentiment::model::{Article, UserArticleSet};
use stock_news_sentiment::reclassify::Reclassifier;
use stock_news_sentiment::store::{ArticleStore, DynStore, MemoryStore, SqliteStore};

fn general(url: &str, title: &str, description: &str, minute: u32) -> Article {
    Article {
        id: None,
        symbol: "MARKET".into(),
        title: title.into(),
        description: description.into(),
        url: url.into(),
        published_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
        category: "General".into(),
        ai_sentiment: Some("neutral".into()),
        ai_confidence: Some(50),
        ai_reasoning: None,
    }
}

async fn seed(store: &DynStore) {
    for a in [
        general("https://n/1", "S&P 500 closes at record", "", 1),
        general("https://n/2", "Markets mixed", "The Dow Jones slipped late", 2),
        general("https://n/3", "Gold climbs on haven demand", "", 3),
    ] {
        store.upsert_by_url(&a).await.unwrap();
    }
}

async fn assert_reclassify(store: DynStore) {
    seed(&store).await;
    let r = Reclassifier::new(
        store.clone(),
        Arc::new(HotReloadRules::new("tests/does-not-exist.json")),
    );

    let first = r.run().await.unwrap();
    assert!(first.success);
    assert_eq!(first.total_processed, 3);
    assert_eq!(first.updated_count, 2);

    let spy = store.get_by_url("https://n/1").await.unwrap().unwrap();
    assert_eq!((spy.symbol.as_str(), spy.category.as_str()), ("SPY", "Index Fund"));
    let dia = store.get_by_url("https://n/2").await.unwrap().unwrap();
    assert_eq!(dia.symbol, "DIA");
    // Sentiment fields survive the move.
    assert_eq!(dia.ai_confidence, Some(50));
    let gold = store.get_by_url("https://n/3").await.unwrap().unwrap();
    assert_eq!((gold.symbol.as_str(), gold.category.as_str()), ("MARKET", "General"));

    let second = r.run().await.unwrap();
    assert_eq!(second.total_processed, 1);
    assert_eq!(second.updated_count, 0);
    assert!(second.updates.is_empty());
}

#[tokio::test]
async fn reclassify_memory_store() {
    assert_reclassify(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn reclassify_sqlite_store() {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    assert_reclassify(Arc::new(store)).await;
}

#[tokio::test]
async fn rules_file_overrides_builtin_priority() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rules.json");
    std::fs::write(
        &path,
        r#"{"rules":[{"name":"gold","when":{"any_contains":["gold"]},"then":{"symbol":"GLD","category":"Commodity"}}]}"#,
    )
    .unwrap();

    let store: DynStore = Arc::new(MemoryStore::new());
    seed(&store).await;
    let report = Reclassifier::new(store.clone(), Arc::new(HotReloadRules::new(&path)))
        .run()
        .await
        .unwrap();

    assert_eq!(report.updated_count, 1);
    assert_eq!(report.updates[0].new_symbol, "GLD");
    let spy = store.get_by_url("https://n/1").await.unwrap().unwrap();
    assert_eq!(spy.symbol, "MARKET");
}

#[tokio::test]
async fn sqlite_user_articles_round_trip() {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    let set = UserArticleSet {
        user_id: "u-7".into(),
        symbol: "AMZN".into(),
        articles: vec![general("https://n/amzn", "Amazon expands", "", 5)],
        updated_at: Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap(),
    };
    store.upsert_user_articles(&set).await.unwrap();

    let got = store.get_user_articles("u-7", "AMZN").await.unwrap().unwrap();
    assert_eq!(got, set);

    let mut emptied = set.clone();
    emptied.articles.clear();
    store.upsert_user_articles(&emptied).await.unwrap();
    let got = store.get_user_articles("u-7", "AMZN").await.unwrap().unwrap();
    assert!(got.articles.is_empty());

    assert!(store.get_user_articles("u-8", "AMZN").await.unwrap().is_none());
}

#[tokio::test]
async fn backends_agree_on_sub_second_timestamps() {
    let mut a = general("https://n/ms", "Fed minutes released", "", 9);
    a.published_at = Utc.timestamp_opt(1_714_564_800, 123_456_789).unwrap();

    let memory: DynStore = Arc::new(MemoryStore::new());
    let sqlite: DynStore = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
    let mut rows = Vec::new();
    for store in [&memory, &sqlite] {
        let written = store.upsert_by_url(&a).await.unwrap();
        let read = store.get_by_url("https://n/ms").await.unwrap().unwrap();
        assert_eq!(written, read);
        rows.push(read);
    }

    assert_eq!(rows[0], rows[1]);
    assert_eq!(rows[0].published_at.timestamp_subsec_millis(), 123);
    assert_eq!(rows[0].published_at.timestamp_subsec_nanos(), 123_000_000);
}
