// tests/ingest_pipeline.rs
//
// End-to-end ingestion with a static news source and a scripted model:
// fetch -> normalize/dedup -> classify -> upsert, then one scheduler tick.

use std::sync::Arc;

use chrono::{Duration, Utc};

use stock_news_sentiment::ai_adapter::ScriptedProvider;
use stock_news_sentiment::analyze::classifier::SentimentClassifier;
use stock_news_sentiment::analyze::rules::HotReloadRules;
use stock_news_sentiment::config::{ClassifierConfig, RetentionConfig, SchedulerConfig};
use stock_news_sentiment::ingest::scheduler::run_tick;
use stock_news_sentiment::ingest::throttle::{Throttle, ThrottledSource};
use stock_news_sentiment::ingest::types::{RawArticle, StaticNewsSource};
use stock_news_sentiment::ingest::{Ingestor, COMPANY_CATEGORY};
use stock_news_sentiment::reclassify::Reclassifier;
use stock_news_sentiment::store::{ArticleStore, MemoryStore};

fn item(title: &str, url: &str, age_days: i64) -> RawArticle {
    RawArticle {
        title: title.into(),
        description: String::new(),
        url: url.into(),
        published_at: Utc::now() - Duration::days(age_days),
        source: "Test".into(),
    }
}

fn ingestor(source: StaticNewsSource, provider: ScriptedProvider, store: Arc<MemoryStore>) -> (Ingestor, Arc<StaticNewsSource>) {
    let source = Arc::new(source);
    let classifier = Arc::new(SentimentClassifier::new(
        Arc::new(provider),
        ClassifierConfig::default(),
    ));
    (Ingestor::new(source.clone(), classifier, store, 10), source)
}

#[tokio::test]
async fn failing_symbol_is_recorded_and_run_continues_in_order() {
    let store = Arc::new(MemoryStore::new());
    let (ing, source) = ingestor(
        StaticNewsSource::new()
            .with_company("SPY", vec![item("SPY sees inflows", "https://n/1", 0)])
            .with_company("MSFT", vec![item("Microsoft ships update", "https://n/2", 0)])
            .failing_for("QQQ"),
        ScriptedProvider::always(r#"{"sentiment":"negative","confidence":70,"reasoning":"r"}"#),
        store.clone(),
    );

    let report = ing
        .run(&["SPY".into(), "QQQ".into(), "MSFT".into(), "ROKU".into()])
        .await;

    assert!(!report.success);
    assert_eq!(source.calls(), vec!["SPY", "QQQ", "MSFT", "ROKU"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].symbol, "QQQ");
    assert_eq!(report.processed.len(), 3);
    assert_eq!(report.total_stored, 2);

    let msft = store.get_by_url("https://n/2").await.unwrap().unwrap();
    assert_eq!(msft.symbol, "MSFT");
    assert_eq!(msft.category, "Mega Cap");
    assert_eq!(msft.ai_sentiment.as_deref(), Some("negative"));

    let roku = report.processed.iter().find(|r| r.symbol == "ROKU").unwrap();
    assert_eq!(roku.fetched, 0);
}

#[tokio::test]
async fn duplicates_and_blank_items_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    let (ing, _) = ingestor(
        StaticNewsSource::new().with_company(
            "NVDA",
            vec![
                item("<b>Nvidia</b> beats", "https://n/a", 0),
                item("Nvidia beats (dup)", "https://n/a", 0),
                item("   ", "https://n/b", 0),
            ],
        ),
        ScriptedProvider::new(),
        store.clone(),
    );

    let r = ing.ingest_symbol("nvda").await.unwrap();
    assert_eq!((r.fetched, r.stored, r.skipped), (3, 1, 2));

    let row = store.get_by_url("https://n/a").await.unwrap().unwrap();
    assert_eq!(row.title, "Nvidia beats");
    // Empty script: the classifier fell back to neutral.
    assert_eq!(row.ai_sentiment.as_deref(), Some("neutral"));
    assert_eq!(row.ai_confidence, Some(50));
}

#[tokio::test]
async fn known_urls_are_not_classified_again() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(
        ScriptedProvider::new()
            .then_reply(r#"{"sentiment":"positive","confidence":60,"reasoning":"first"}"#)
            .then_reply(r#"{"sentiment":"negative","confidence":40,"reasoning":"second"}"#),
    );
    let source = Arc::new(
        StaticNewsSource::new().with_company("ROKU", vec![item("Roku adds subscribers", "https://n/r", 0)]),
    );
    let classifier = Arc::new(SentimentClassifier::new(provider.clone(), ClassifierConfig::default()));
    let ing = Ingestor::new(source, classifier, store.clone(), 10);

    let first = ing.ingest_symbol("ROKU").await.unwrap();
    let second = ing.ingest_symbol("ROKU").await.unwrap();

    assert_eq!((first.stored, first.skipped), (1, 0));
    assert_eq!((second.stored, second.skipped), (0, 1));
    assert_eq!(provider.requests().len(), 1);
    let row = store.get_by_url("https://n/r").await.unwrap().unwrap();
    assert_eq!(row.category, COMPANY_CATEGORY);
    assert_eq!(row.ai_reasoning.as_deref(), Some("first"));
}

#[tokio::test]
async fn reassigned_general_headline_survives_next_tick() {
    let store = Arc::new(MemoryStore::new());
    let (ing, _) = ingestor(
        StaticNewsSource::new().with_general(vec![item("Nvidia unveils new chip", "https://n/nv", 0)]),
        ScriptedProvider::new(),
        store.clone(),
    );
    let reclassifier = Reclassifier::new(
        store.clone(),
        Arc::new(HotReloadRules::new("tests/does-not-exist.json")),
    );

    ing.ingest_general().await.unwrap();
    assert_eq!(reclassifier.run().await.unwrap().updated_count, 1);

    let again = ing.ingest_general().await.unwrap();
    assert_eq!(again.stored, 0);
    assert_eq!(reclassifier.run().await.unwrap().updated_count, 0);
    let row = store.get_by_url("https://n/nv").await.unwrap().unwrap();
    assert_eq!(row.symbol, "NVDA");
}

#[tokio::test]
async fn throttled_source_passes_results_through() {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ThrottledSource::new(
        StaticNewsSource::new().with_company("DIA", vec![item("Dow Jones edges up", "https://n/d", 0)]),
        Throttle::unlimited(),
    ));
    let classifier = Arc::new(SentimentClassifier::new(
        Arc::new(ScriptedProvider::new()),
        ClassifierConfig::default(),
    ));
    let ing = Ingestor::new(source, classifier, store.clone(), 5);

    let r = ing.ingest_symbol("DIA").await.unwrap();
    assert_eq!(r.stored, 1);
    let row = store.get_by_url("https://n/d").await.unwrap().unwrap();
    assert_eq!(row.category, "Index Fund");
}

#[tokio::test]
async fn scheduler_tick_ingests_sweeps_and_reclassifies() {
    let store = Arc::new(MemoryStore::new());
    let (ing, source) = ingestor(
        StaticNewsSource::new()
            .with_company("SPY", vec![item("SPY flat", "https://n/s", 0)])
            .with_general(vec![
                item("Tesla recalls vehicles", "https://n/g-fresh", 1),
                item("Stale market wrap", "https://n/g-stale", 30),
            ]),
        ScriptedProvider::new(),
        store.clone(),
    );
    let reclassifier = Reclassifier::new(
        store.clone(),
        Arc::new(HotReloadRules::new("tests/does-not-exist.json")),
    );
    let cfg = SchedulerConfig {
        enabled: true,
        interval_secs: 60,
        symbols: vec!["SPY".into()],
        include_general: true,
    };

    run_tick(&cfg, &RetentionConfig::default(), &ing, &reclassifier).await;

    assert_eq!(source.calls(), vec!["SPY", "*"]);
    assert!(store.get_by_url("https://n/g-stale").await.unwrap().is_none());
    let moved = store.get_by_url("https://n/g-fresh").await.unwrap().unwrap();
    assert_eq!(moved.symbol, "TSLA");
    assert_eq!(moved.category, "Mega Cap");
    assert_eq!(store.len().await, 2);
}
